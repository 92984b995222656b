#![forbid(unsafe_code)]

//! Segment scheduler: the control loop that joins the playback clock,
//! the chosen representation, the buffered range map and the media sink
//! into a serial segment pipeline, plus the garbage collector that runs
//! when the sink signals capacity exhaustion.

mod error;
mod events;
mod gc;
mod pipeline;
mod scheduler;
mod sink;

pub use error::BufferError;
pub use events::BufferEvent;
pub use gc::{collect, plan_removals, GC_GAP_BEEFY_SECS, GC_GAP_CALM_SECS};
pub use pipeline::{FetchError, FetchEvent, FetchPipeline, FetchResult, ParsedSegment, SegmentRequest};
pub use scheduler::{
    IndexResolver, SchedulerInputs, SegmentScheduler, SharedIndex, BITRATE_REBUFFERING_RATIO,
};
pub use sink::{MediaSink, SinkError, SinkLock};
