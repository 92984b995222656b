use std::{collections::HashMap, time::Instant};

use tracing::{debug, warn};

/// Progress of one in-flight request.
#[derive(Clone, Copy, Debug)]
pub struct RequestProgress {
    pub bytes: u64,
    pub at: Instant,
}

#[derive(Clone, Debug)]
struct PendingRequest {
    segment_duration_secs: f64,
    requested_at: Instant,
    last_progress: Option<RequestProgress>,
}

/// Registry of in-flight segment requests.
///
/// Progress samples must arrive in non-decreasing timestamp order per
/// request; violations are dropped silently. Unknown ids on removal are
/// tolerated with a warning. Requests still open at disposal are leaks
/// and reported once each.
#[derive(Debug, Default)]
pub struct PendingRequestRegistry {
    requests: HashMap<String, PendingRequest>,
}

impl PendingRequestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }

    pub fn begin(
        &mut self,
        request_id: &str,
        _segment_time_secs: f64,
        segment_duration_secs: f64,
        at: Instant,
    ) {
        let previous = self.requests.insert(
            request_id.to_owned(),
            PendingRequest {
                segment_duration_secs,
                requested_at: at,
                last_progress: None,
            },
        );
        if previous.is_some() {
            warn!(request_id, "pending request re-opened without an end");
        }
    }

    pub fn progress(&mut self, request_id: &str, bytes: u64, at: Instant) {
        let Some(req) = self.requests.get_mut(request_id) else {
            debug!(request_id, "progress for unknown request ignored");
            return;
        };
        if req.last_progress.is_some_and(|p| at < p.at) {
            // Out-of-order sample: dropped, not fatal.
            return;
        }
        req.last_progress = Some(RequestProgress { bytes, at });
    }

    pub fn end(&mut self, request_id: &str) {
        if self.requests.remove(request_id).is_none() {
            warn!(request_id, "removing unknown pending request");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Worst projected effective bandwidth (bits per second) among
    /// requests that have been in flight longer than half their segment
    /// duration. Young requests are excluded: their projections are
    /// dominated by connection setup.
    #[must_use]
    pub fn worst_case_bps(&self, now: Instant) -> Option<f64> {
        self.requests
            .values()
            .filter_map(|req| {
                let elapsed = now.saturating_duration_since(req.requested_at).as_secs_f64();
                if elapsed <= req.segment_duration_secs / 2.0 {
                    return None;
                }
                let bytes = req.last_progress.map_or(0, |p| p.bytes);
                #[expect(clippy::cast_precision_loss)]
                let bps = bytes as f64 * 8.0 / elapsed.max(1e-3);
                Some(bps)
            })
            .min_by(f64::total_cmp)
    }

    /// Remove and report every request still open. Called on disposal;
    /// anything returned here is a request-span leak.
    pub fn drain_leaks(&mut self) -> Vec<String> {
        let mut leaked: Vec<String> = self.requests.drain().map(|(id, _)| id).collect();
        leaked.sort_unstable();
        for id in &leaked {
            warn!(request_id = %id, "request span leaked: begin without end");
        }
        leaked
    }
}
