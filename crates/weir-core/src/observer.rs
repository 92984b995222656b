use std::time::{Duration, Instant};

use crate::MediaType;

/// Throughput feedback seam between the segment pipeline and the ABR layer.
///
/// The scheduler reports the lifecycle of every fetch through this trait;
/// the ABR manager is the production implementation. Kept here so the
/// buffer crate never depends on the ABR crate directly.
///
/// Contract: for every `request_begin(id)` exactly one `request_end(id)`
/// is delivered before disposal, including for cancelled fetches.
pub trait TransferObserver: Send + Sync {
    /// A fetch was issued for a media segment.
    fn request_begin(
        &self,
        media_type: MediaType,
        request_id: &str,
        segment_time_secs: f64,
        segment_duration_secs: f64,
        at: Instant,
    );

    /// Bytes received so far on an in-flight fetch.
    fn request_progress(&self, media_type: MediaType, request_id: &str, bytes: u64, at: Instant);

    /// The fetch left the in-flight set (completed, failed or cancelled).
    fn request_end(&self, media_type: MediaType, request_id: &str);

    /// A transfer finished; feeds the completed-request estimator.
    fn transfer_completed(&self, media_type: MediaType, elapsed: Duration, bytes: u64);
}

/// Observer that ignores everything. Useful for tests and side renderers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransferObserver;

impl TransferObserver for NullTransferObserver {
    fn request_begin(&self, _: MediaType, _: &str, _: f64, _: f64, _: Instant) {}

    fn request_progress(&self, _: MediaType, _: &str, _: u64, _: Instant) {}

    fn request_end(&self, _: MediaType, _: &str) {}

    fn transfer_completed(&self, _: MediaType, _: Duration, _: u64) {}
}
