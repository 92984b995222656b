use serde::{Deserialize, Serialize};

/// Closed set of media types the engine buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    Text,
    Image,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Audio,
        MediaType::Video,
        MediaType::Text,
        MediaType::Image,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Text => "text",
            MediaType::Image => "image",
        }
    }

    /// Per-type scheduling parameters.
    ///
    /// Video gets a wider padding window than the other types; text and
    /// image payloads bypass the native sink entirely.
    #[must_use]
    pub fn profile(self) -> TypeProfile {
        match self {
            MediaType::Video => TypeProfile {
                low_water_pad_secs: 4.0,
                high_water_pad_secs: 6.0,
                init_policy: InitSegmentPolicy::Required,
                sink_kind: SinkKind::Native,
            },
            MediaType::Audio => TypeProfile {
                low_water_pad_secs: 1.0,
                high_water_pad_secs: 1.0,
                init_policy: InitSegmentPolicy::Required,
                sink_kind: SinkKind::Native,
            },
            MediaType::Text => TypeProfile {
                low_water_pad_secs: 1.0,
                high_water_pad_secs: 1.0,
                init_policy: InitSegmentPolicy::PerAdaptation,
                sink_kind: SinkKind::SideRenderer,
            },
            MediaType::Image => TypeProfile {
                low_water_pad_secs: 1.0,
                high_water_pad_secs: 1.0,
                init_policy: InitSegmentPolicy::None,
                sink_kind: SinkKind::SideRenderer,
            },
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a type needs an init segment before media segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitSegmentPolicy {
    /// Always prepend an init segment on (re)subscription.
    Required,
    /// The owning adaptation decides (text tracks).
    PerAdaptation,
    /// Never fetch an init segment.
    None,
}

/// Where parsed payloads of a type are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    /// Appended to the native media sink.
    Native,
    /// Handed to a side renderer (subtitles, thumbnails).
    SideRenderer,
}

/// Scheduling parameters for one media type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TypeProfile {
    /// Buffer gap below which no padding is applied.
    pub low_water_pad_secs: f64,
    /// Upper bound on the padding skipped ahead of the playhead.
    pub high_water_pad_secs: f64,
    pub init_policy: InitSegmentPolicy,
    pub sink_kind: SinkKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_water_marks_are_wider() {
        let video = MediaType::Video.profile();
        let audio = MediaType::Audio.profile();
        assert_eq!(video.low_water_pad_secs, 4.0);
        assert_eq!(video.high_water_pad_secs, 6.0);
        assert_eq!(audio.low_water_pad_secs, 1.0);
        assert_eq!(audio.high_water_pad_secs, 1.0);
    }

    #[test]
    fn text_and_image_bypass_native_sink() {
        assert_eq!(MediaType::Text.profile().sink_kind, SinkKind::SideRenderer);
        assert_eq!(MediaType::Image.profile().sink_kind, SinkKind::SideRenderer);
        assert_eq!(MediaType::Video.profile().sink_kind, SinkKind::Native);
    }

    #[test]
    fn display_matches_wire_names() {
        for ty in MediaType::ALL {
            assert_eq!(ty.to_string(), ty.as_str());
        }
    }
}
