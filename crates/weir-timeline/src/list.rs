use tracing::debug;
use weir_core::{MediaTime, SegmentRef, SegmentTiming};

use crate::{SegmentIndex, TimelineError, TimelineResult};

/// One explicitly enumerated segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub start: i64,
    pub duration: i64,
    pub media: String,
    pub byte_range: Option<(u64, u64)>,
}

impl ListEntry {
    fn end(&self) -> i64 {
        self.start + self.duration
    }
}

/// Fully enumerated index for on-demand content: every segment is
/// declared up front, so resolution is plain enumeration.
pub struct ListIndex {
    timescale: u32,
    init_media: Option<String>,
    entries: Vec<ListEntry>,
}

impl ListIndex {
    pub fn new(timescale: u32, init_media: Option<String>, entries: Vec<ListEntry>) -> Self {
        Self {
            timescale: timescale.max(1),
            init_media,
            entries,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    #[expect(clippy::cast_possible_truncation)]
    fn to_ticks(&self, seconds: f64) -> i64 {
        (seconds * f64::from(self.timescale)).round() as i64
    }

    #[expect(clippy::cast_precision_loss)]
    fn to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 / f64::from(self.timescale)
    }

    fn make_ref(&self, rep_id: &str, position: usize, entry: &ListEntry) -> SegmentRef {
        SegmentRef {
            id: format!("{rep_id}.{}", entry.start),
            time: MediaTime::new(entry.start, self.timescale),
            duration: Some(MediaTime::new(entry.duration, self.timescale)),
            number: u32::try_from(position + 1).ok(),
            byte_range: entry.byte_range,
            is_init: false,
            media: entry.media.clone(),
        }
    }
}

impl SegmentIndex for ListIndex {
    fn segments_in(&self, rep_id: &str, up: f64, to: f64) -> TimelineResult<Vec<SegmentRef>> {
        let Some(first) = self.entries.first() else {
            return Err(TimelineError::OutOfIndex { position: up });
        };
        let up_tick = self.to_ticks(up);
        let to_tick = self.to_ticks(to);
        if up_tick < first.start {
            return Err(TimelineError::OutOfIndex { position: up });
        }
        let last_end = self.entries[self.entries.len() - 1].end();
        if up_tick >= last_end {
            return Err(TimelineError::OutOfIndex { position: up });
        }

        Ok(self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.end() > up_tick && e.start < to_tick)
            .map(|(i, e)| self.make_ref(rep_id, i, e))
            .collect())
    }

    fn init_reference(&self, rep_id: &str) -> Option<SegmentRef> {
        let media = self.init_media.clone()?;
        Some(SegmentRef {
            id: format!("{rep_id}.init"),
            time: MediaTime::ZERO,
            duration: None,
            number: None,
            byte_range: None,
            is_init: true,
            media,
        })
    }

    fn should_refresh(&self, _up: f64, to: f64) -> bool {
        self.entries
            .last()
            .is_none_or(|last| self.to_ticks(to) > last.end())
    }

    fn first_position(&self) -> Option<f64> {
        self.entries.first().map(|e| self.to_seconds(e.start))
    }

    fn last_position(&self) -> Option<f64> {
        self.entries.last().map(|e| self.to_seconds(e.end()))
    }

    fn check_discontinuity(&self, time: f64) -> f64 {
        if time <= 0.0 {
            return -1.0;
        }
        let tick = self.to_ticks(time);
        let Some(idx) = self
            .entries
            .iter()
            .position(|e| tick >= e.start && tick < e.end())
        else {
            return -1.0;
        };
        let Some(next) = self.entries.get(idx + 1) else {
            return -1.0;
        };
        if next.start != self.entries[idx].end() {
            self.to_seconds(next.start)
        } else {
            -1.0
        }
    }

    fn add_segment_infos(
        &mut self,
        new_segment: SegmentTiming,
        _current_segment: Option<SegmentTiming>,
    ) -> bool {
        // A list index is fully declared; only appends past the end are
        // meaningful (e.g. an updated manifest replayed through here).
        let scale = |v: i64, ts: u32| {
            if ts == self.timescale || ts == 0 {
                v
            } else {
                #[expect(clippy::cast_possible_truncation)]
                let scaled = (i128::from(v) * i128::from(self.timescale) / i128::from(ts)) as i64;
                scaled
            }
        };
        let time = scale(new_segment.time, new_segment.timescale);
        let duration = scale(new_segment.duration, new_segment.timescale);
        let last_end = self.entries.last().map_or(0, ListEntry::end);
        if time < last_end {
            debug!(time, last_end, "list index ignores non-appending segment info");
            return false;
        }
        self.entries.push(ListEntry {
            start: time,
            duration,
            media: String::new(),
            byte_range: None,
        });
        true
    }
}
