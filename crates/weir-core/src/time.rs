use std::time::Duration;

/// Rational media time: an integer tick count over a timescale.
///
/// Timeline arithmetic stays exact as long as both operands share a
/// timescale; mixed-timescale comparison cross-multiplies in i128 so no
/// precision is lost there either.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaTime {
    value: i64,
    timescale: u32,
}

impl MediaTime {
    pub const ZERO: Self = Self {
        value: 0,
        timescale: 1,
    };
    pub const POSITIVE_INFINITY: Self = Self {
        value: i64::MAX,
        timescale: 1,
    };

    #[must_use]
    pub fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn from_seconds(seconds: f64, timescale: u32) -> Self {
        Self {
            value: (seconds * f64::from(timescale)).round() as i64,
            timescale,
        }
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    #[must_use]
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / f64::from(self.timescale)
    }

    #[must_use]
    pub fn is_indefinite(&self) -> bool {
        self.value == i64::MAX
    }

    /// Re-express this time in another timescale, rounding to the nearest tick.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn rescale(&self, timescale: u32) -> Self {
        if self.timescale == timescale {
            return *self;
        }
        let scaled =
            i128::from(self.value) * i128::from(timescale) / i128::from(self.timescale.max(1));
        Self {
            value: scaled as i64,
            timescale,
        }
    }

    #[must_use]
    pub fn to_duration(&self) -> Option<Duration> {
        if self.is_indefinite() || self.value < 0 {
            return None;
        }
        Some(Duration::from_secs_f64(self.seconds()))
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Eq for MediaTime {}

impl std::hash::Hash for MediaTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.timescale.hash(state);
    }
}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = i128::from(self.value) * i128::from(other.timescale);
        let rhs = i128::from(other.value) * i128::from(self.timescale);
        lhs.cmp(&rhs)
    }
}

impl std::ops::Add for MediaTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        if self.timescale == rhs.timescale {
            return Self::new(self.value.saturating_add(rhs.value), self.timescale);
        }
        let ts = self.timescale.max(rhs.timescale);
        Self::from_seconds(self.seconds() + rhs.seconds(), ts)
    }
}

impl std::ops::Sub for MediaTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        if self.timescale == rhs.timescale {
            return Self::new(self.value.saturating_sub(rhs.value), self.timescale);
        }
        let ts = self.timescale.max(rhs.timescale);
        Self::from_seconds(self.seconds() - rhs.seconds(), ts)
    }
}
