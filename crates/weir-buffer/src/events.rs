use weir_core::MediaType;

/// Events the scheduler emits to the player layer.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferEvent {
    /// A segment was fetched, parsed and appended.
    Loaded {
        media_type: MediaType,
        representation_id: String,
        segment_id: String,
        /// `[start, end)` seconds recorded in the range map; `None` for
        /// init segments.
        range: Option<(f64, f64)>,
    },

    /// HTTP 412 from the pipeline; the scheduler backs off and rebuilds.
    PreconditionFailed { media_type: MediaType },

    /// The timeline cannot resolve the requested window; the player layer
    /// reacts with a manifest refresh.
    OutOfIndex {
        media_type: MediaType,
        position: f64,
    },

    /// The garbage collector reclaimed ranges after a quota signal.
    Collected {
        media_type: MediaType,
        removed: Vec<(f64, f64)>,
    },

    /// Unrecoverable failure; the scheduler has terminated.
    Fatal {
        media_type: MediaType,
        message: String,
    },
}
