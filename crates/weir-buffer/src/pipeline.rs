use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use weir_core::{Adaptation, MediaType, Representation, SegmentRef, SegmentTiming};

/// Typed fetch/parse failure kinds.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP 412: the only status with special semantics. The scheduler
    /// backs off and rebuilds its inner loop.
    #[error("precondition failed (http 412)")]
    PreconditionFailed,

    #[error("fetch failed: {0}")]
    Failed(String),

    #[error("parse failed: {0}")]
    Parse(String),
}

/// One fetch request handed to the pipeline.
#[derive(Clone, Debug)]
pub struct SegmentRequest {
    pub media_type: MediaType,
    pub adaptation: Arc<Adaptation>,
    pub representation: Representation,
    pub segment: SegmentRef,
}

/// Terminal payload of a successful fetch+parse.
#[derive(Clone, Debug, Default)]
pub struct ParsedSegment {
    /// Opaque bytes for the sink (or side renderer).
    pub blob: Bytes,
    /// Timescale override discovered while parsing.
    pub timescale: Option<u32>,
    /// Timing of segments announced by this one (live timelines).
    pub next_segments: Vec<SegmentTiming>,
    /// Timing of the segment itself, as parsed from the payload.
    pub current_segment: Option<SegmentTiming>,
}

/// Events a fetch emits: any number of progress reports, then exactly one
/// terminal `Parsed`.
#[derive(Clone, Debug)]
pub enum FetchEvent {
    Progress { bytes: u64 },
    Parsed(ParsedSegment),
}

pub type FetchResult = Result<FetchEvent, FetchError>;

/// Capability set of the fetch+parse pipeline.
///
/// Implementations stream progress and a terminal parse result over the
/// returned channel. Dropping the receiver cancels the fetch; buffered
/// bytes are discarded by the implementation.
#[async_trait]
pub trait FetchPipeline: Send + Sync {
    async fn fetch(&self, request: SegmentRequest) -> mpsc::Receiver<FetchResult>;
}
