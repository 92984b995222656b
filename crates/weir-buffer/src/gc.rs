use tracing::{debug, info};
use weir_ranges::RangeMap;

use crate::sink::{MediaSink, SinkError, SinkLock};

/// First-pass distance from the playhead; only far-away data goes.
pub const GC_GAP_CALM_SECS: f64 = 240.0;
/// Second-pass distance, used when the calm pass reclaimed nothing.
pub const GC_GAP_BEEFY_SECS: f64 = 30.0;

/// Plan the spans to reclaim around playback position `position`,
/// preserving a symmetric `gap` window so short back-seeks stay cheap.
///
/// Outer ranges ending before `position - gap` or starting after
/// `position + gap` go entirely; the range containing the playhead is
/// trimmed on both sides.
#[must_use]
pub fn plan_removals(ranges: &RangeMap, position: f64, gap: f64) -> Vec<(f64, f64)> {
    let mut plan = Vec::new();
    for range in ranges.iter() {
        if range.contains(position) {
            if position - gap > range.start {
                plan.push((range.start, position - gap));
            }
            if range.end > position + gap {
                plan.push((position + gap, range.end));
            }
        } else if range.end < position - gap || range.start > position + gap {
            plan.push((range.start, range.end));
        }
    }
    plan
}

/// Reclaim sink space after a `QuotaExceeded`.
///
/// Runs the calm pass, escalates to the beefy pass when it yields
/// nothing, then issues the removals serially under the sink lock and
/// resyncs `ranges` against the sink. Returns the spans removed.
pub async fn collect(
    sink: &dyn MediaSink,
    lock: &SinkLock,
    ranges: &mut RangeMap,
    position: f64,
) -> Result<Vec<(f64, f64)>, SinkError> {
    let mut plan = plan_removals(ranges, position, GC_GAP_CALM_SECS);
    if plan.is_empty() {
        debug!(position, "calm pass reclaimed nothing, escalating");
        plan = plan_removals(ranges, position, GC_GAP_BEEFY_SECS);
    }
    if plan.is_empty() {
        info!(position, "nothing to reclaim around playhead");
        return Ok(plan);
    }

    for &(start, end) in &plan {
        let _guard = lock.lock().await;
        lock.settled(sink).await;
        sink.remove(start, end).await?;
        info!(start, end, "reclaimed buffered range");
    }

    let sink_ranges = RangeMap::from_untagged(&sink.buffered());
    ranges.intersect(&sink_ranges);
    Ok(plan)
}
