use crate::{InitSegmentPolicy, MediaTime, MediaType};

/// A contiguous, independently fetchable unit of one representation.
///
/// `time` and `duration` are expressed in the owning index's timescale;
/// an open-ended live segment has `duration == None`.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentRef {
    pub id: String,
    pub time: MediaTime,
    pub duration: Option<MediaTime>,
    pub number: Option<u32>,
    pub byte_range: Option<(u64, u64)>,
    pub is_init: bool,
    /// Media URL with `$Number$` / `$Time$` placeholders already expanded.
    pub media: String,
}

impl SegmentRef {
    #[must_use]
    pub fn start_seconds(&self) -> f64 {
        self.time.seconds()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.map(|d| d.seconds())
    }

    /// End of the segment in seconds, when the duration is known.
    #[must_use]
    pub fn end_seconds(&self) -> Option<f64> {
        self.duration_seconds().map(|d| self.start_seconds() + d)
    }
}

/// Timing metadata a parser extracts from segment payloads.
///
/// Fed back into the timeline index (`add_segment_infos`) to grow live
/// timelines without a manifest round-trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentTiming {
    pub time: i64,
    pub duration: i64,
    pub timescale: u32,
}

/// One selectable quality. Immutable after manifest load.
///
/// The representation does not own its timeline index; the session's
/// manifest arena maps representation ids to index handles so schedulers
/// and the manifest never form a reference cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Representation {
    pub id: String,
    pub bitrate: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: String,
}

/// A set of interchangeable representations of one media type.
#[derive(Clone, Debug)]
pub struct Adaptation {
    pub id: String,
    pub media_type: MediaType,
    /// Ascending bitrate order; choosers rely on it.
    pub representations: Vec<Representation>,
    /// Overrides the type profile's policy for text tracks.
    pub init_policy: Option<InitSegmentPolicy>,
}

impl Adaptation {
    /// Effective init-segment policy: adaptation override, else type default.
    #[must_use]
    pub fn effective_init_policy(&self) -> InitSegmentPolicy {
        self.init_policy
            .unwrap_or(self.media_type.profile().init_policy)
    }

    #[must_use]
    pub fn lowest_bitrate(&self) -> Option<&Representation> {
        self.representations.first()
    }
}
