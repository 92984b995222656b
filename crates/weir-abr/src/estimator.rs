use std::time::Duration;

/// Throughput estimation seam, mockable in chooser tests.
#[cfg_attr(any(test, feature = "test-utils"), unimock::unimock(api = BandwidthEstimatorMock))]
pub trait BandwidthEstimator: Send {
    /// Estimated throughput in bits per second, `None` before any usable
    /// sample arrived.
    fn estimate_bps(&self) -> Option<f64>;

    /// Feed one completed transfer.
    fn add_sample(&mut self, elapsed: Duration, bytes: u64);
}

/// EWMA throughput estimator over completed transfers.
///
/// Two exponential windows are tracked and the pessimistic one wins: the
/// fast window reacts to sudden drops, the slow one smooths bursts.
#[derive(Clone, Debug)]
pub struct EwmaBandwidthEstimator {
    fast: Ewma,
    slow: Ewma,
}

impl EwmaBandwidthEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    /// Transfers smaller than this teach us nothing about the link.
    const MIN_SAMPLE_BYTES: u64 = 16_000;
    const MIN_DURATION_SECS: f64 = 0.000_5;

    #[must_use]
    pub fn new() -> Self {
        Self {
            fast: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
        }
    }
}

impl Default for EwmaBandwidthEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthEstimator for EwmaBandwidthEstimator {
    fn estimate_bps(&self) -> Option<f64> {
        let est = self.fast.get_estimate().min(self.slow.get_estimate());
        (est > 0.0).then_some(est)
    }

    #[expect(clippy::cast_precision_loss)]
    fn add_sample(&mut self, elapsed: Duration, bytes: u64) {
        if bytes < Self::MIN_SAMPLE_BYTES {
            return;
        }
        let secs = elapsed.as_secs_f64().max(Self::MIN_DURATION_SECS);
        let bps = bytes as f64 * 8.0 / secs;
        self.fast.add_sample(secs, bps);
        self.slow.add_sample(secs, bps);
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        self.last_estimate = val * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight.max(0.0);
    }

    fn get_estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
        self.last_estimate / zero_factor.max(1e-6)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn no_estimate_without_samples() {
        let est = EwmaBandwidthEstimator::new();
        assert_eq!(est.estimate_bps(), None);
    }

    #[test]
    fn tiny_transfers_are_ignored() {
        let mut est = EwmaBandwidthEstimator::new();
        est.add_sample(Duration::from_millis(100), 1_000);
        assert_eq!(est.estimate_bps(), None);

        est.add_sample(Duration::from_secs(1), 125_000);
        assert!(est.estimate_bps().is_some());
    }

    #[rstest]
    #[case(vec![(125_000, 1_000)], 800_000.0)]
    #[case(vec![(125_000, 1_000), (125_000, 1_000), (125_000, 1_000)], 990_000.0)]
    fn stable_link_converges_to_real_rate(
        #[case] samples: Vec<(u64, u64)>,
        #[case] at_least_bps: f64,
    ) {
        let mut est = EwmaBandwidthEstimator::new();
        for (bytes, millis) in samples {
            est.add_sample(Duration::from_millis(millis), bytes);
        }
        // 125 kB/s == 1 Mbps; the zero-factor correction keeps early
        // estimates close to the observed rate.
        let bps = est.estimate_bps().unwrap();
        assert!(bps >= at_least_bps, "estimate {bps} too low");
        assert!(bps <= 1_100_000.0, "estimate {bps} too high");
    }

    #[test]
    fn fast_window_reacts_to_collapse() {
        let mut est = EwmaBandwidthEstimator::new();
        for _ in 0..5 {
            est.add_sample(Duration::from_secs(1), 1_250_000); // 10 Mbps
        }
        let before = est.estimate_bps().unwrap();
        for _ in 0..3 {
            est.add_sample(Duration::from_secs(4), 100_000); // 0.2 Mbps
        }
        let after = est.estimate_bps().unwrap();
        assert!(after < before / 4.0, "collapse not reflected: {after}");
    }

    #[test]
    fn zero_duration_is_clamped() {
        let mut est = EwmaBandwidthEstimator::new();
        est.add_sample(Duration::ZERO, 100_000);
        assert!(est.estimate_bps().unwrap() > 1_000_000.0);
    }
}
