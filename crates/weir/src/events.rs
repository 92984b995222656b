use tokio::sync::broadcast;
use weir_core::MediaType;

/// Player-facing events of one session.
#[derive(Clone, Debug)]
pub enum WeirEvent {
    /// The ABR layer selected a (new) representation.
    RepresentationChanged {
        media_type: MediaType,
        representation_id: String,
        bitrate: u32,
    },
    /// A segment was appended to the sink.
    SegmentLoaded {
        media_type: MediaType,
        segment_id: String,
        range: Option<(f64, f64)>,
    },
    /// HTTP 412 recovery in progress.
    PreconditionFailed { media_type: MediaType },
    /// The timeline ran out; the player layer should refetch the manifest.
    ManifestRefreshNeeded {
        media_type: MediaType,
        position: f64,
    },
    /// Buffered ranges were reclaimed after a quota signal.
    BufferCollected {
        media_type: MediaType,
        removed: Vec<(f64, f64)>,
    },
    /// A scheduler terminated on an unrecoverable error.
    FatalError {
        media_type: MediaType,
        message: String,
    },
    /// The session was disposed; carries the number of leaked request
    /// spans (0 in a healthy run).
    Disposed { leaked_requests: usize },
}

/// Broadcast event bus shared by every component of a session.
///
/// `publish` is synchronous and never blocks; without subscribers events
/// are dropped. Slow subscribers observe `RecvError::Lagged` instead of
/// back-pressuring producers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<WeirEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: WeirEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WeirEvent> {
        self.tx.subscribe()
    }
}
