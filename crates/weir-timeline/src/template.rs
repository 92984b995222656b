use tracing::debug;
use weir_core::{MediaTime, SegmentRef, SegmentTiming};

use crate::{SegmentIndex, TimelineError, TimelineResult};

/// Duration marker for an entry that extends to the next timeline update.
const OPEN_ENDED: i64 = -1;

/// Repeat marker for an entry that repeats until bounded by the caller.
const UNBOUNDED: i64 = -1;

/// One run-length encoded timeline entry: `repeat + 1` consecutive
/// segments of `duration` ticks starting at `start`.
///
/// `duration == -1` marks a live entry whose length is unknown until the
/// next update; at most one such entry exists and it is always last.
/// `repeat == -1` (last entry only) repeats until bounded by the query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    pub start: i64,
    pub duration: i64,
    pub repeat: i64,
}

impl TimelineEntry {
    /// End tick of the entry's span; an open-ended entry collapses to its
    /// start, an unbounded repeat extends to the representable maximum.
    fn range_end(&self) -> i64 {
        if self.duration == OPEN_ENDED {
            return self.start;
        }
        if self.repeat == UNBOUNDED {
            return i64::MAX;
        }
        self.start + self.duration * (self.repeat + 1)
    }
}

/// Template-with-timeline index: an ordered run-length encoded schedule
/// plus a media URL template.
pub struct TemplateIndex {
    timescale: u32,
    media: String,
    init_media: Option<String>,
    start_number: u32,
    presentation_time_offset: i64,
    timeline: Vec<TimelineEntry>,
}

impl TemplateIndex {
    /// Build an index from raw timeline entries.
    ///
    /// Negative repeat counts from source data are normalized here: a
    /// non-last entry repeats until the next entry's start, the last one
    /// (with `period_end` known) until the period end, otherwise it stays
    /// unbounded and queries clamp it.
    pub fn new(
        timescale: u32,
        media: impl Into<String>,
        init_media: Option<String>,
        start_number: u32,
        presentation_time_offset: i64,
        entries: Vec<TimelineEntry>,
        period_end: Option<i64>,
    ) -> Self {
        let mut timeline = entries;
        let len = timeline.len();
        for idx in 0..len {
            let entry = timeline[idx];
            if entry.repeat >= 0 || entry.duration == OPEN_ENDED {
                continue;
            }
            let bound = if idx + 1 < len {
                Some(timeline[idx + 1].start)
            } else {
                period_end
            };
            timeline[idx].repeat = match bound {
                Some(end) if entry.duration > 0 => {
                    ((end - entry.start + entry.duration - 1) / entry.duration - 1).max(0)
                }
                _ => UNBOUNDED,
            };
        }

        Self {
            timescale: timescale.max(1),
            media: media.into(),
            init_media,
            start_number,
            presentation_time_offset,
            timeline,
        }
    }

    #[must_use]
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    #[must_use]
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    fn to_ticks(&self, seconds: f64) -> i64 {
        #[expect(clippy::cast_possible_truncation)]
        let scaled = (seconds * f64::from(self.timescale)).round() as i64;
        scaled - self.presentation_time_offset
    }

    #[expect(clippy::cast_precision_loss)]
    fn to_seconds(&self, ticks: i64) -> f64 {
        (ticks + self.presentation_time_offset) as f64 / f64::from(self.timescale)
    }

    /// Index of the greatest entry with `start <= tick`.
    fn floor_entry(&self, tick: i64) -> Option<usize> {
        match self.timeline.binary_search_by(|e| e.start.cmp(&tick)) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// Longest concrete segment duration seen in the timeline.
    fn max_duration(&self) -> i64 {
        self.timeline
            .iter()
            .map(|e| e.duration.max(0))
            .max()
            .unwrap_or(0)
    }

    /// Effective repeat count of the entry at `idx`, clamping unbounded
    /// repeats to the representable maximum (callers bound by `to`).
    fn effective_repeat(&self, idx: usize) -> i64 {
        let entry = self.timeline[idx];
        if entry.repeat >= 0 {
            return entry.repeat;
        }
        match self.timeline.get(idx + 1) {
            Some(next) if entry.duration > 0 => {
                ((next.start - entry.start + entry.duration - 1) / entry.duration - 1).max(0)
            }
            _ => i64::MAX,
        }
    }

    /// Number of segment instances strictly before entry `idx`.
    fn instances_before(&self, idx: usize) -> i64 {
        self.timeline[..idx]
            .iter()
            .enumerate()
            .map(|(i, e)| {
                if e.duration == OPEN_ENDED {
                    1
                } else {
                    self.effective_repeat(i).saturating_add(1)
                }
            })
            .fold(0i64, i64::saturating_add)
    }

    fn make_ref(&self, rep_id: &str, tick: i64, duration: Option<i64>, position: i64) -> SegmentRef {
        let number = u32::try_from(i64::from(self.start_number).saturating_add(position)).ok();
        SegmentRef {
            id: format!("{rep_id}.{tick}"),
            time: MediaTime::new(tick, self.timescale),
            duration: duration.map(|d| MediaTime::new(d, self.timescale)),
            number,
            byte_range: None,
            is_init: false,
            media: expand_template(&self.media, number, tick),
        }
    }

    fn rescale(&self, value: i64, timescale: u32) -> i64 {
        if timescale == self.timescale || timescale == 0 {
            return value;
        }
        #[expect(clippy::cast_possible_truncation)]
        let scaled =
            (i128::from(value) * i128::from(self.timescale) / i128::from(timescale)) as i64;
        scaled
    }
}

impl SegmentIndex for TemplateIndex {
    fn segments_in(&self, rep_id: &str, up: f64, to: f64) -> TimelineResult<Vec<SegmentRef>> {
        let Some(first) = self.timeline.first() else {
            return Err(TimelineError::OutOfIndex { position: up });
        };
        let up_tick = self.to_ticks(up);
        let to_tick = self.to_ticks(to);
        if up_tick < first.start {
            return Err(TimelineError::OutOfIndex { position: up });
        }
        let last = self.timeline[self.timeline.len() - 1];
        if last.duration != OPEN_ENDED && up_tick >= last.range_end() {
            return Err(TimelineError::OutOfIndex { position: up });
        }

        let start_idx = self.floor_entry(up_tick).unwrap_or(0);
        let mut out = Vec::new();
        let mut position = self.instances_before(start_idx);

        for idx in start_idx..self.timeline.len() {
            let entry = self.timeline[idx];
            if entry.start >= to_tick {
                break;
            }

            if entry.duration == OPEN_ENDED {
                // Live edge: emit the single open-ended reference only when
                // the window asks far enough past the entry's start.
                if entry.start + self.max_duration() < to_tick {
                    out.push(self.make_ref(rep_id, entry.start, None, position));
                }
                break;
            }

            let repeat = self.effective_repeat(idx);
            let first_k = if up_tick > entry.start {
                (up_tick - entry.start) / entry.duration
            } else {
                0
            };
            let mut k = first_k;
            while k <= repeat {
                let tick = entry.start + k * entry.duration;
                if tick >= to_tick {
                    break;
                }
                out.push(self.make_ref(rep_id, tick, Some(entry.duration), position + k));
                k += 1;
            }
            position = position.saturating_add(repeat.saturating_add(1));
        }

        Ok(out)
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
        let Some(last) = self.timeline.last() else {
            return true;
        };
        self.to_ticks(to) > last.range_end()
    }

    fn first_position(&self) -> Option<f64> {
        self.timeline.first().map(|e| self.to_seconds(e.start))
    }

    fn last_position(&self) -> Option<f64> {
        self.timeline.last().map(|e| self.to_seconds(e.range_end()))
    }

    fn check_discontinuity(&self, time: f64) -> f64 {
        if time <= 0.0 {
            return -1.0;
        }
        let tick = self.to_ticks(time);
        let Some(idx) = self.floor_entry(tick) else {
            return -1.0;
        };
        let entry = self.timeline[idx];
        if entry.duration <= 0 {
            return -1.0;
        }
        let repeat = entry.repeat;
        if repeat < 0 {
            return -1.0;
        }
        let k = (tick - entry.start) / entry.duration;
        if k < repeat {
            return -1.0;
        }
        let Some(next) = self.timeline.get(idx + 1) else {
            return -1.0;
        };
        let expected = entry.start + entry.duration * (repeat + 1);
        if next.start != expected {
            self.to_seconds(next.start)
        } else {
            -1.0
        }
    }

    fn add_segment_infos(
        &mut self,
        new_segment: SegmentTiming,
        current_segment: Option<SegmentTiming>,
    ) -> bool {
        let new_time = self.rescale(new_segment.time, new_segment.timescale);
        let new_duration = self.rescale(new_segment.duration, new_segment.timescale);

        if self.timeline.is_empty() {
            self.timeline.push(TimelineEntry {
                start: new_time,
                duration: new_duration,
                repeat: 0,
            });
            return true;
        }

        let last_idx = self.timeline.len() - 1;
        let last = self.timeline[last_idx];
        let current_time = current_segment.map(|c| self.rescale(c.time, c.timescale));

        if current_time == Some(new_time) {
            // Deduction mode: the parser told us the duration of the
            // segment we just played; the successor starts right after it.
            let successor_start = new_time + new_duration;
            let last_start = if last.duration == OPEN_ENDED {
                last.start
            } else {
                last.start + last.duration * last.repeat.max(0)
            };
            let ts_diff = successor_start - last_start;
            if ts_diff == 0 {
                debug!(tick = successor_start, "segment timing already recorded");
                return false;
            }
            if ts_diff < 0 {
                debug!(
                    tick = successor_start,
                    last_start, "segment timing behind the live edge"
                );
                return false;
            }

            let deduced = ts_diff;
            let merged_into_prev = last_idx > 0 && self.timeline[last_idx - 1].duration == deduced;
            if merged_into_prev {
                self.timeline[last_idx - 1].repeat += 1;
                self.timeline.pop();
            } else {
                self.timeline[last_idx].duration = deduced;
            }
            self.timeline.push(TimelineEntry {
                start: successor_start,
                duration: OPEN_ENDED,
                repeat: 0,
            });
            return true;
        }

        // Append mode: only segments at or past the current end extend the
        // timeline.
        if new_time >= last.range_end() {
            if last.duration == new_duration {
                self.timeline[last_idx].repeat += 1;
            } else {
                self.timeline.push(TimelineEntry {
                    start: new_time,
                    duration: new_duration,
                    repeat: 0,
                });
            }
            return true;
        }

        false
    }
}

/// Expand `$Number$` and `$Time$` placeholders in a media URL template.
fn expand_template(template: &str, number: Option<u32>, time: i64) -> String {
    let mut out = template.to_owned();
    if let Some(n) = number {
        out = out.replace("$Number$", &n.to_string());
    }
    out.replace("$Time$", &time.to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use weir_core::SegmentTiming;

    use super::*;

    fn entry(start: i64, duration: i64, repeat: i64) -> TimelineEntry {
        TimelineEntry {
            start,
            duration,
            repeat,
        }
    }

    fn index(entries: Vec<TimelineEntry>) -> TemplateIndex {
        TemplateIndex::new(10, "seg-$Time$.m4s", Some("init.mp4".into()), 1, 0, entries, None)
    }

    fn times(refs: &[SegmentRef]) -> Vec<i64> {
        refs.iter().map(|r| r.time.value()).collect()
    }

    #[test]
    fn segments_in_expands_repeats() {
        // Three segments of 10 ticks at 0, then two of 20 at 30.
        let idx = index(vec![entry(0, 10, 2), entry(30, 20, 1)]);
        let refs = idx.segments_in("v", 0.0, 7.0).unwrap();
        assert_eq!(times(&refs), vec![0, 10, 20, 30, 50]);
        assert!(refs.iter().all(|r| !r.is_init));
        assert_eq!(refs[0].media, "seg-0.m4s");
        assert_eq!(refs[3].media, "seg-30.m4s");
    }

    #[test]
    fn segments_in_starts_at_floor_instance() {
        let idx = index(vec![entry(0, 10, 9)]);
        // up = 3.5s -> tick 35 -> instance starting at 30.
        let refs = idx.segments_in("v", 3.5, 6.0).unwrap();
        assert_eq!(times(&refs), vec![30, 40, 50]);
    }

    #[test]
    fn numbers_are_monotonic_from_start_number() {
        let idx = index(vec![entry(0, 10, 2), entry(30, 10, 0)]);
        let refs = idx.segments_in("v", 0.0, 4.0).unwrap();
        let numbers: Vec<u32> = refs.iter().filter_map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        let tail = idx.segments_in("v", 3.0, 4.0).unwrap();
        assert_eq!(tail[0].number, Some(4));
    }

    #[test]
    fn ids_are_unique_per_time() {
        let idx = index(vec![entry(0, 10, 4)]);
        let refs = idx.segments_in("v", 0.0, 5.0).unwrap();
        let mut ids: Vec<&str> = refs.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), refs.len());
    }

    #[rstest]
    #[case(12.0, true)] // ts + maxDuration = 100 < to=120 -> emitted
    #[case(9.5, false)] // to=95 <= 100 -> suppressed
    fn open_ended_entry_gated_by_max_duration(#[case] to: f64, #[case] emitted: bool) {
        let idx = index(vec![entry(0, 10, 8), entry(90, OPEN_ENDED, 0)]);
        let refs = idx.segments_in("v", 9.0, to).unwrap();
        let open: Vec<_> = refs.iter().filter(|r| r.duration.is_none()).collect();
        assert_eq!(open.len(), usize::from(emitted));
        if emitted {
            assert_eq!(open[0].time.value(), 90);
        }
    }

    #[test]
    fn single_open_ended_entry_without_history() {
        // No concrete duration seen: maxDuration = 0, so ts < to suffices.
        let idx = index(vec![entry(100, OPEN_ENDED, 0)]);
        let refs = idx.segments_in("v", 10.0, 12.0).unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].duration.is_none());
    }

    #[test]
    fn before_first_entry_is_out_of_index() {
        let idx = index(vec![entry(100, 10, 4)]);
        let err = idx.segments_in("v", 0.0, 5.0).unwrap_err();
        assert!(matches!(err, TimelineError::OutOfIndex { .. }));
    }

    #[test]
    fn past_bounded_end_is_out_of_index() {
        let idx = index(vec![entry(0, 10, 4)]);
        assert!(idx.segments_in("v", 6.0, 9.0).is_err());
        // An open-ended tail keeps the index alive instead.
        let live = index(vec![entry(0, 10, 4), entry(50, OPEN_ENDED, 0)]);
        assert!(live.segments_in("v", 6.0, 9.0).is_ok());
    }

    #[test]
    fn should_refresh_tracks_timeline_extent() {
        let idx = index(vec![entry(0, 10, 4)]);
        assert!(!idx.should_refresh(0.0, 5.0));
        assert!(idx.should_refresh(0.0, 5.1));

        // Open-ended last entry collapses to zero duration.
        let live = index(vec![entry(0, 10, 4), entry(50, OPEN_ENDED, 0)]);
        assert!(live.should_refresh(0.0, 5.1));
        assert!(!live.should_refresh(0.0, 5.0));
    }

    #[test]
    fn positions_come_from_timeline_bounds() {
        let idx = index(vec![entry(20, 10, 3)]);
        assert_eq!(idx.first_position(), Some(2.0));
        assert_eq!(idx.last_position(), Some(6.0));
    }

    #[test]
    fn discontinuity_detected_in_last_instance_only() {
        // [0..30) in three segments, then a gap, next entry at 50.
        let idx = index(vec![entry(0, 10, 2), entry(50, 10, 0)]);
        // Inside a non-final instance: no jump.
        assert_eq!(idx.check_discontinuity(1.5), -1.0);
        // Inside the last instance before the gap: jump to 5.0s.
        assert_eq!(idx.check_discontinuity(2.5), 5.0);
        // Contiguous timelines never report one.
        let contiguous = index(vec![entry(0, 10, 2), entry(30, 10, 0)]);
        assert_eq!(contiguous.check_discontinuity(2.5), -1.0);
    }

    #[test]
    fn discontinuity_ignores_nonpositive_time() {
        let idx = index(vec![entry(0, 10, 2), entry(50, 10, 0)]);
        assert_eq!(idx.check_discontinuity(0.0), -1.0);
        assert_eq!(idx.check_discontinuity(-3.0), -1.0);
    }

    #[test]
    fn add_segment_infos_deduction_then_idempotent() {
        let mut idx = index(vec![entry(100, OPEN_ENDED, 0)]);
        let new_seg = SegmentTiming {
            time: 100,
            duration: 4,
            timescale: 10,
        };
        let current = SegmentTiming {
            time: 100,
            duration: 0,
            timescale: 10,
        };

        assert!(idx.add_segment_infos(new_seg, Some(current)));
        assert_eq!(
            idx.timeline(),
            &[entry(100, 4, 0), entry(104, OPEN_ENDED, 0)]
        );

        // Same pair again: no change, returns false.
        assert!(!idx.add_segment_infos(new_seg, Some(current)));
        assert_eq!(
            idx.timeline(),
            &[entry(100, 4, 0), entry(104, OPEN_ENDED, 0)]
        );
    }

    #[test]
    fn add_segment_infos_deduction_merges_equal_previous() {
        let mut idx = index(vec![entry(96, 4, 0), entry(100, OPEN_ENDED, 0)]);
        let new_seg = SegmentTiming {
            time: 100,
            duration: 4,
            timescale: 10,
        };
        let current = SegmentTiming {
            time: 100,
            duration: 0,
            timescale: 10,
        };
        assert!(idx.add_segment_infos(new_seg, Some(current)));
        // Previous entry shares the deduced duration: its repeat grows and
        // the old open-ended entry is replaced.
        assert_eq!(
            idx.timeline(),
            &[entry(96, 4, 1), entry(104, OPEN_ENDED, 0)]
        );
    }

    #[test]
    fn add_segment_infos_appends_past_end() {
        let mut idx = index(vec![entry(0, 10, 1)]);
        let same_duration = SegmentTiming {
            time: 20,
            duration: 10,
            timescale: 10,
        };
        assert!(idx.add_segment_infos(same_duration, None));
        assert_eq!(idx.timeline(), &[entry(0, 10, 2)]);

        let new_duration = SegmentTiming {
            time: 30,
            duration: 12,
            timescale: 10,
        };
        assert!(idx.add_segment_infos(new_duration, None));
        assert_eq!(idx.timeline(), &[entry(0, 10, 2), entry(30, 12, 0)]);

        // Behind the end: rejected.
        assert!(!idx.add_segment_infos(same_duration, None));
    }

    #[test]
    fn add_segment_infos_rescales_foreign_timescale() {
        let mut idx = index(vec![entry(0, 10, 1)]);
        // 2s at timescale 90: rescaled to tick 20 at timescale 10.
        let seg = SegmentTiming {
            time: 180,
            duration: 90,
            timescale: 90,
        };
        assert!(idx.add_segment_infos(seg, None));
        assert_eq!(idx.timeline(), &[entry(0, 10, 2)]);
    }

    #[test]
    fn negative_repeat_normalized_at_insertion() {
        let idx = TemplateIndex::new(
            10,
            "seg-$Number$.m4s",
            None,
            1,
            0,
            vec![entry(0, 10, -1), entry(35, 10, 0)],
            None,
        );
        // ceil((35 - 0) / 10) - 1 = 3.
        assert_eq!(idx.timeline()[0].repeat, 3);

        let bounded_by_period = TemplateIndex::new(
            10,
            "seg-$Number$.m4s",
            None,
            1,
            0,
            vec![entry(0, 10, -1)],
            Some(50),
        );
        assert_eq!(bounded_by_period.timeline()[0].repeat, 4);
    }

    #[test]
    fn presentation_time_offset_shifts_queries() {
        let idx = TemplateIndex::new(
            10,
            "seg-$Time$.m4s",
            None,
            1,
            100,
            vec![entry(0, 10, 4)],
            None,
        );
        // 10s of presentation time -> tick 100 - pto 100 = 0.
        let refs = idx.segments_in("v", 10.0, 12.0).unwrap();
        assert_eq!(times(&refs), vec![0, 10]);
        assert_eq!(idx.first_position(), Some(10.0));
    }

    #[test]
    fn init_reference_uses_init_template() {
        let idx = index(vec![entry(0, 10, 0)]);
        let init = idx.init_reference("v").unwrap();
        assert!(init.is_init);
        assert_eq!(init.media, "init.mp4");
        assert_eq!(init.id, "v.init");
    }
}
