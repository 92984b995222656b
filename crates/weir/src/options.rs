use serde::{Deserialize, Serialize};
use url::Url;

/// Engine-level options, fixed for the lifetime of a session.
#[derive(Clone, Debug)]
pub struct PlayerOptions {
    /// Target buffer built ahead of the playhead, in seconds.
    pub wanted_buffer_ahead: f64,
    /// Hard cap on how far ahead the engine may buffer.
    pub max_buffer_ahead: f64,
    /// Seconds retained behind the playhead before eviction may reclaim.
    pub max_buffer_behind: f64,
    /// Filter video representations wider than the viewport.
    pub limit_video_width: bool,
    /// Throttle video bitrate to the floor while the page is hidden.
    pub throttle_when_hidden: bool,
    pub initial_audio_bitrate: Option<u32>,
    pub initial_video_bitrate: Option<u32>,
    pub max_audio_bitrate: Option<u32>,
    pub max_video_bitrate: Option<u32>,
    pub default_audio_track: Option<String>,
    pub default_text_track: Option<String>,
    /// Swallow the first seek emission (the initial programmatic seek at
    /// load time). Disable for integrations that never issue one.
    pub skip_initial_seek: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            wanted_buffer_ahead: 30.0,
            max_buffer_ahead: 30.0,
            max_buffer_behind: 30.0,
            limit_video_width: false,
            throttle_when_hidden: false,
            initial_audio_bitrate: None,
            initial_video_bitrate: None,
            max_audio_bitrate: None,
            max_video_bitrate: None,
            default_audio_track: None,
            default_text_track: None,
            skip_initial_seek: true,
            event_capacity: 32,
        }
    }
}

impl PlayerOptions {
    pub fn with_wanted_buffer_ahead(mut self, seconds: f64) -> Self {
        self.wanted_buffer_ahead = seconds;
        self
    }

    pub fn with_max_buffer_ahead(mut self, seconds: f64) -> Self {
        self.max_buffer_ahead = seconds;
        self
    }

    pub fn with_max_buffer_behind(mut self, seconds: f64) -> Self {
        self.max_buffer_behind = seconds;
        self
    }

    pub fn with_limit_video_width(mut self, limit: bool) -> Self {
        self.limit_video_width = limit;
        self
    }

    pub fn with_throttle_when_hidden(mut self, throttle: bool) -> Self {
        self.throttle_when_hidden = throttle;
        self
    }

    pub fn with_initial_video_bitrate(mut self, bitrate: u32) -> Self {
        self.initial_video_bitrate = Some(bitrate);
        self
    }

    pub fn with_initial_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.initial_audio_bitrate = Some(bitrate);
        self
    }

    pub fn with_max_video_bitrate(mut self, bitrate: u32) -> Self {
        self.max_video_bitrate = Some(bitrate);
        self
    }

    pub fn with_max_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.max_audio_bitrate = Some(bitrate);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Effective buffering target: the wanted size clamped by the cap.
    #[must_use]
    pub fn effective_buffer_ahead(&self) -> f64 {
        self.wanted_buffer_ahead.min(self.max_buffer_ahead)
    }
}

/// Manifest transport flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Dash,
    Smooth,
    DirectFile,
}

/// Initial playback position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartAt {
    /// Absolute wall-clock time, for live streams with a known epoch.
    WallClockTime(f64),
    /// Absolute position in seconds of media time.
    Position(f64),
    /// Seconds after the first indexed position.
    FromFirstPosition(f64),
    /// Seconds before the last indexed position.
    FromLastPosition(f64),
    /// Percentage of the indexed span (0..=100).
    Percentage(f64),
}

/// Per-load options.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub url: Url,
    pub transport: Transport,
    pub auto_play: bool,
    pub key_systems: Vec<String>,
    pub hide_native_subtitle: bool,
    pub supplementary_text_tracks: Vec<Url>,
    pub supplementary_image_tracks: Vec<Url>,
    pub start_at: Option<StartAt>,
    /// Bypass manifest handling entirely and play the URL as-is;
    /// forces the transport to [`Transport::DirectFile`].
    pub direct_file: bool,
}

impl LoadOptions {
    pub fn new(url: Url, transport: Transport) -> Self {
        Self {
            url,
            transport,
            auto_play: false,
            key_systems: Vec::new(),
            hide_native_subtitle: false,
            supplementary_text_tracks: Vec::new(),
            supplementary_image_tracks: Vec::new(),
            start_at: None,
            direct_file: false,
        }
    }

    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn with_start_at(mut self, start_at: StartAt) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn with_direct_file(mut self, direct_file: bool) -> Self {
        self.direct_file = direct_file;
        self
    }

    /// Transport after `direct_file` forcing.
    #[must_use]
    pub fn effective_transport(&self) -> Transport {
        if self.direct_file {
            Transport::DirectFile
        } else {
            self.transport
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = PlayerOptions::default();
        assert_eq!(opts.wanted_buffer_ahead, 30.0);
        assert_eq!(opts.max_buffer_ahead, 30.0);
        assert_eq!(opts.max_buffer_behind, 30.0);
        assert!(opts.skip_initial_seek);
        assert!(!opts.limit_video_width);
    }

    #[test]
    fn effective_buffer_ahead_is_clamped() {
        let opts = PlayerOptions::default()
            .with_wanted_buffer_ahead(60.0)
            .with_max_buffer_ahead(40.0);
        assert_eq!(opts.effective_buffer_ahead(), 40.0);
    }

    #[test]
    fn direct_file_forces_transport() {
        let url = Url::parse("https://example.com/video.mp4").unwrap();
        let opts = LoadOptions::new(url, Transport::Dash).with_direct_file(true);
        assert_eq!(opts.effective_transport(), Transport::DirectFile);
    }
}
