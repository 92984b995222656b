use thiserror::Error;

use crate::{pipeline::FetchError, sink::SinkError};

/// Terminal scheduler failures. Everything here is fatal for the session
/// except `Fetch(PreconditionFailed)`, which the scheduler converts into
/// a backoff before it ever reaches a caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The pipeline dropped its channel without a terminal event.
    #[error("fetch pipeline closed before a terminal event")]
    PipelineClosed,
}
