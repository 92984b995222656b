#![forbid(unsafe_code)]

//! Segment timeline index: resolves playback time to concrete segment
//! references.
//!
//! Two variants share one surface ([`SegmentIndex`]): a compact
//! run-length encoded template index for live and template manifests
//! ([`TemplateIndex`]), and an explicitly enumerated list index
//! ([`ListIndex`]) for fully-declared on-demand content.

mod list;
mod template;

use thiserror::Error;
use weir_core::{SegmentRef, SegmentTiming};

pub use list::{ListEntry, ListIndex};
pub use template::{TemplateIndex, TimelineEntry};

#[derive(Debug, Error)]
pub enum TimelineError {
    /// The requested position lies outside the indexed range; the player
    /// layer reacts with a manifest refresh.
    #[error("position {position}s is outside the indexed range")]
    OutOfIndex { position: f64 },
}

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Time-to-segment resolution surface shared by both index variants.
///
/// All positions are in seconds of presentation time; the index converts
/// through its own timescale and presentation time offset internally.
pub trait SegmentIndex: Send {
    /// All media segment references overlapping `[up, to)`.
    fn segments_in(&self, rep_id: &str, up: f64, to: f64) -> TimelineResult<Vec<SegmentRef>>;

    /// The init segment reference, when the representation carries one.
    fn init_reference(&self, rep_id: &str) -> Option<SegmentRef>;

    /// Whether the index stops short of `to` and the manifest should be
    /// refetched to extend it.
    fn should_refresh(&self, up: f64, to: f64) -> bool;

    /// Start of the first indexed segment, in seconds.
    fn first_position(&self) -> Option<f64>;

    /// End of the last indexed segment, in seconds.
    fn last_position(&self) -> Option<f64>;

    /// Start (seconds) of the entry after a known gap containing `time`,
    /// or `-1.0` when there is no discontinuity to jump.
    fn check_discontinuity(&self, time: f64) -> f64;

    /// Ingest parser-reported segment timing. Returns `true` when the
    /// timeline changed; repeated application of the same pair is a no-op.
    fn add_segment_infos(
        &mut self,
        new_segment: SegmentTiming,
        current_segment: Option<SegmentTiming>,
    ) -> bool;
}
