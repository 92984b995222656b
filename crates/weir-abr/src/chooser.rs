use std::time::{Duration, Instant};

use tracing::debug;
use weir_core::{MediaType, Representation};

use crate::{
    estimator::{BandwidthEstimator, EwmaBandwidthEstimator},
    registry::PendingRequestRegistry,
};

/// Why a representation was selected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChoiceReason {
    /// A manual bitrate ceiling was active.
    Manual,
    /// Throughput-based automatic selection.
    Auto,
    /// An in-flight request projected below the estimate; its worst-case
    /// projection was used to pre-empt a stall.
    EmergencyDownSwitch,
    /// Degenerate inputs (no estimate, empty candidate set): lowest wins.
    LowestFallback,
}

/// Outcome of one evaluation.
///
/// `emit` is the downstream gate: publish the selection only when it is
/// set, so unchanged decisions do not churn the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Choice {
    pub index: usize,
    pub bitrate: u32,
    pub reason: ChoiceReason,
    pub emit: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ChooserOptions {
    /// Re-emission window for stable, unchanged selections.
    pub stability_window: Duration,
}

impl Default for ChooserOptions {
    fn default() -> Self {
        Self {
            stability_window: Duration::from_secs(2),
        }
    }
}

/// Per-media-type representation chooser.
///
/// Representations are expected in ascending bitrate order (the
/// adaptation guarantees it). The chooser never fails; degenerate input
/// falls back to the lowest representation.
pub struct RepresentationChooser<E: BandwidthEstimator = EwmaBandwidthEstimator> {
    media_type: MediaType,
    options: ChooserOptions,
    estimator: E,
    registry: PendingRequestRegistry,
    manual_bitrate: Option<u32>,
    max_auto_bitrate: Option<u32>,
    width_limit: Option<u32>,
    throttle_bitrate: Option<u32>,
    last_emitted: Option<usize>,
    last_emit_at: Option<Instant>,
    previous_candidate: Option<usize>,
}

impl RepresentationChooser<EwmaBandwidthEstimator> {
    #[must_use]
    pub fn new(media_type: MediaType, options: ChooserOptions) -> Self {
        Self::with_estimator(media_type, options, EwmaBandwidthEstimator::new())
    }
}

impl<E: BandwidthEstimator> RepresentationChooser<E> {
    pub fn with_estimator(media_type: MediaType, options: ChooserOptions, estimator: E) -> Self {
        Self {
            media_type,
            options,
            estimator,
            registry: PendingRequestRegistry::new(),
            manual_bitrate: None,
            max_auto_bitrate: None,
            width_limit: None,
            throttle_bitrate: None,
            last_emitted: None,
            last_emit_at: None,
            previous_candidate: None,
        }
    }

    /// Manual selection ceiling; `None` re-enables automatic adaptation.
    pub fn set_manual_bitrate(&mut self, bitrate: Option<u32>) {
        self.manual_bitrate = bitrate;
    }

    pub fn set_max_auto_bitrate(&mut self, bitrate: Option<u32>) {
        self.max_auto_bitrate = bitrate;
    }

    /// Current viewport width; `None` lifts the constraint.
    pub fn set_width_limit(&mut self, width: Option<u32>) {
        self.width_limit = width;
    }

    /// External throttle ceiling (e.g. page hidden); `None` lifts it.
    pub fn set_throttle(&mut self, bitrate: Option<u32>) {
        self.throttle_bitrate = bitrate;
    }

    /// Feed a completed transfer into the bandwidth estimator.
    pub fn add_estimate(&mut self, elapsed: Duration, bytes: u64) {
        self.estimator.add_sample(elapsed, bytes);
    }

    pub fn request_begin(&mut self, id: &str, time_secs: f64, duration_secs: f64, at: Instant) {
        self.registry.begin(id, time_secs, duration_secs, at);
    }

    pub fn request_progress(&mut self, id: &str, bytes: u64, at: Instant) {
        self.registry.progress(id, bytes, at);
    }

    pub fn request_end(&mut self, id: &str) {
        self.registry.end(id);
    }

    /// Report and clear any request spans still open. Disposal hook.
    pub fn drain_leaks(&mut self) -> Vec<String> {
        self.registry.drain_leaks()
    }

    /// Evaluate the current selection.
    ///
    /// Returns `None` only for an empty representation list. The returned
    /// choice carries `emit = true` when the decision changed, or when the
    /// stability window elapsed and the candidate held across two
    /// consecutive evaluations.
    pub fn decide(&mut self, representations: &[Representation], now: Instant) -> Option<Choice> {
        if representations.is_empty() {
            return None;
        }

        let (index, reason) = if let Some(manual) = self.manual_bitrate {
            let idx = representations
                .iter()
                .rposition(|r| r.bitrate <= manual)
                .unwrap_or(0);
            (idx, ChoiceReason::Manual)
        } else {
            self.decide_auto(representations, now)
        };

        let changed = self.last_emitted != Some(index);
        let window_elapsed = self
            .last_emit_at
            .is_none_or(|t| now.duration_since(t) >= self.options.stability_window);
        let stable = self.previous_candidate == Some(index);
        let emit = changed || (window_elapsed && stable);

        self.previous_candidate = Some(index);
        if emit {
            self.last_emitted = Some(index);
            self.last_emit_at = Some(now);
            debug!(
                media_type = %self.media_type,
                bitrate = representations[index].bitrate,
                ?reason,
                "representation selected"
            );
        }

        Some(Choice {
            index,
            bitrate: representations[index].bitrate,
            reason,
            emit,
        })
    }

    fn decide_auto(
        &mut self,
        representations: &[Representation],
        now: Instant,
    ) -> (usize, ChoiceReason) {
        let Some(estimate) = self.estimator.estimate_bps() else {
            return (0, ChoiceReason::LowestFallback);
        };

        let mut reason = ChoiceReason::Auto;
        let mut effective = estimate;
        if let Some(worst) = self.registry.worst_case_bps(now) {
            if worst < estimate {
                debug!(
                    media_type = %self.media_type,
                    estimate,
                    worst,
                    "in-flight projection below estimate"
                );
                effective = worst;
                reason = ChoiceReason::EmergencyDownSwitch;
            }
        }

        let mut ceiling = effective;
        for cap in [self.max_auto_bitrate, self.throttle_bitrate].into_iter().flatten() {
            ceiling = ceiling.min(f64::from(cap));
        }

        let mut candidates: Vec<usize> = representations
            .iter()
            .enumerate()
            .filter(|(_, r)| f64::from(r.bitrate) <= ceiling)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return (0, ChoiceReason::LowestFallback);
        }

        if let Some(limit) = self.width_limit {
            let fitting: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| representations[i].width.is_none_or(|w| w <= limit))
                .collect();
            // The viewport filter never empties the set: the lowest
            // candidate survives regardless.
            candidates = if fitting.is_empty() {
                vec![candidates[0]]
            } else {
                fitting
            };
        }

        match candidates.last() {
            Some(&best) => (best, reason),
            None => (0, ChoiceReason::LowestFallback),
        }
    }
}
