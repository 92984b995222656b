use tracing::trace;

/// Tolerance for boundary comparisons. Range endpoints come from rational
/// tick times converted to seconds, so only float round-off has to be
/// absorbed, not real gaps.
pub const EPSILON: f64 = 1e-4;

/// Half-open interval `[start, end)` in seconds, tagged with the bitrate
/// the covered data was loaded at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
    pub bitrate: u32,
}

impl BufferedRange {
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Sorted, disjoint set of bitrate-tagged intervals.
#[derive(Clone, Debug, Default)]
pub struct RangeMap {
    ranges: Vec<BufferedRange>,
}

impl RangeMap {
    #[must_use]
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Build an untagged map (bitrate 0) from raw `(start, end)` spans,
    /// e.g. the media sink's own buffered ranges.
    #[must_use]
    pub fn from_untagged(spans: &[(f64, f64)]) -> Self {
        let mut map = Self::new();
        for &(start, end) in spans {
            map.insert(0, start, end);
        }
        map
    }

    /// Insert `[start, end)` at `bitrate`.
    ///
    /// Overlapping or touching intervals with the same bitrate are merged;
    /// intervals with a different bitrate are trimmed or split so the new
    /// range dominates (newer inserts win on overlap).
    pub fn insert(&mut self, bitrate: u32, start: f64, end: f64) {
        if !start.is_finite() || !end.is_finite() || end - start <= EPSILON {
            trace!(start, end, "range insert ignored: degenerate interval");
            return;
        }

        let mut incoming = BufferedRange {
            start,
            end,
            bitrate,
        };
        let mut out: Vec<BufferedRange> = Vec::with_capacity(self.ranges.len() + 2);
        let mut placed = false;

        for existing in self.ranges.drain(..) {
            if existing.end < incoming.start - EPSILON {
                out.push(existing);
                continue;
            }
            if existing.start > incoming.end + EPSILON {
                if !placed {
                    out.push(incoming);
                    placed = true;
                }
                out.push(existing);
                continue;
            }

            // Overlapping or touching.
            if existing.bitrate == incoming.bitrate {
                incoming.start = incoming.start.min(existing.start);
                incoming.end = incoming.end.max(existing.end);
                continue;
            }

            let left_remainder = existing.start < incoming.start - EPSILON;
            let right_remainder = existing.end > incoming.end + EPSILON;
            if left_remainder {
                out.push(BufferedRange {
                    start: existing.start,
                    end: incoming.start,
                    bitrate: existing.bitrate,
                });
            }
            if right_remainder {
                if !placed {
                    out.push(incoming);
                    placed = true;
                }
                out.push(BufferedRange {
                    start: incoming.end,
                    end: existing.end,
                    bitrate: existing.bitrate,
                });
            }
            // Neither remainder: existing is fully dominated and dropped.
        }

        if !placed {
            out.push(incoming);
        }
        self.ranges = out;
        debug_assert!(self.is_sorted_disjoint());
    }

    /// Interval containing `t`.
    #[must_use]
    pub fn range_at(&self, t: f64) -> Option<&BufferedRange> {
        self.ranges.iter().find(|r| r.contains(t))
    }

    /// Intervals not containing `t`.
    #[must_use]
    pub fn outer_ranges(&self, t: f64) -> Vec<BufferedRange> {
        self.ranges
            .iter()
            .filter(|r| !r.contains(t))
            .copied()
            .collect()
    }

    /// Distance from `t` to the end of the interval containing it;
    /// `+inf` when `t` lies in no interval.
    #[must_use]
    pub fn gap_ahead(&self, t: f64) -> f64 {
        self.range_at(t).map_or(f64::INFINITY, |r| r.end - t)
    }

    /// An interval whose span contains all of `[start, start + duration]`.
    #[must_use]
    pub fn containing(&self, start: f64, duration: f64) -> Option<&BufferedRange> {
        self.ranges
            .iter()
            .find(|r| r.start <= start + EPSILON && r.end + EPSILON >= start + duration)
    }

    /// Reduce this map to its intersection with `other`, preserving this
    /// map's bitrate tags. Used to resync with the sink's authoritative
    /// ranges after silent eviction.
    pub fn intersect(&mut self, other: &RangeMap) {
        let mut out: Vec<BufferedRange> = Vec::with_capacity(self.ranges.len());
        for r in &self.ranges {
            for o in &other.ranges {
                let start = r.start.max(o.start);
                let end = r.end.min(o.end);
                if end - start <= EPSILON {
                    continue;
                }
                match out.last_mut() {
                    Some(prev)
                        if prev.bitrate == r.bitrate && (start - prev.end).abs() <= EPSILON =>
                    {
                        prev.end = end;
                    }
                    _ => out.push(BufferedRange {
                        start,
                        end,
                        bitrate: r.bitrate,
                    }),
                }
            }
        }
        if out.len() != self.ranges.len() {
            trace!(
                before = self.ranges.len(),
                after = out.len(),
                "range map resynced against sink"
            );
        }
        self.ranges = out;
        debug_assert!(self.is_sorted_disjoint());
    }

    /// Structural equality ignoring bitrate tags.
    #[must_use]
    pub fn equals(&self, other: &RangeMap) -> bool {
        self.ranges.len() == other.ranges.len()
            && self
                .ranges
                .iter()
                .zip(&other.ranges)
                .all(|(a, b)| (a.start - b.start).abs() <= EPSILON && (a.end - b.end).abs() <= EPSILON)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedRange> {
        self.ranges.iter()
    }

    /// Total covered time in seconds.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        self.ranges.iter().map(BufferedRange::length).sum()
    }

    fn is_sorted_disjoint(&self) -> bool {
        self.ranges
            .windows(2)
            .all(|w| w[0].end <= w[1].start + EPSILON)
            && self.ranges.iter().all(|r| r.end > r.start)
    }
}
