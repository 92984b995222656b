#![forbid(unsafe_code)]

//! Adaptive-bitrate media buffer engine.
//!
//! `weir` decides which media segments of which quality to fetch, when to
//! fetch them, and how to feed them into a downstream media sink while
//! reacting to playback position, network conditions and memory
//! pressure. Manifest parsing, DRM, HTTP transport and the native media
//! source are external collaborators behind the [`MediaSink`] and
//! [`FetchPipeline`] seams.
//!
//! The typical integration:
//!
//! 1. parse a manifest into a [`Manifest`] arena (adaptations,
//!    representations and their timeline indexes);
//! 2. start a [`Session`] with the sink/pipeline IO bundle;
//! 3. drive it with [`Session::push_tick`] from the media element's
//!    timing events and subscribe to [`WeirEvent`]s.

mod events;
mod manifest;
mod options;
mod session;

pub use events::{EventBus, WeirEvent};
pub use manifest::{IndexKey, Manifest, Period};
pub use options::{LoadOptions, PlayerOptions, StartAt, Transport};
pub use session::{Session, SessionIo};

pub use weir_abr::{AbrManager, ChooserOptions};
pub use weir_buffer::{
    BufferEvent, FetchError, FetchEvent, FetchPipeline, FetchResult, IndexResolver, MediaSink,
    ParsedSegment, SegmentRequest, SharedIndex, SinkError, SinkLock,
};
pub use weir_clock::{ClockTick, PlaybackState, SeekObserverOptions};
pub use weir_core::{
    Adaptation, MediaTime, MediaType, Representation, SegmentRef, SegmentTiming,
};
pub use weir_ranges::{BufferedRange, RangeMap};
pub use weir_timeline::{ListEntry, ListIndex, SegmentIndex, TemplateIndex, TimelineEntry};
