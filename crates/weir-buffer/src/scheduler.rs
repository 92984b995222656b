use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weir_clock::ClockTick;
use weir_core::{Adaptation, InitSegmentPolicy, MediaType, Representation, SegmentRef, TransferObserver};
use weir_ranges::RangeMap;
use weir_timeline::{SegmentIndex, TimelineError};

use crate::{
    error::BufferError,
    events::BufferEvent,
    gc,
    pipeline::{FetchError, FetchEvent, FetchPipeline, SegmentRequest},
    sink::{MediaSink, SinkError, SinkLock},
};

/// A candidate segment is redundant when its buffered range was loaded at
/// `bitrate * ratio >= current bitrate`.
pub const BITRATE_REBUFFERING_RATIO: f64 = 1.5;

/// Backoff before rebuilding the inner loop after an HTTP 412.
const PRECONDITION_BACKOFF: Duration = Duration::from_secs(2);

/// Shared, mutable handle to a representation's timeline index.
///
/// The manifest arena owns the indexes; schedulers hold handles keyed by
/// representation, which keeps the manifest/scheduler ownership acyclic.
pub type SharedIndex = Arc<parking_lot::Mutex<Box<dyn SegmentIndex>>>;

/// Maps a representation to its timeline index handle.
///
/// Implemented by the manifest arena; the scheduler resolves the handle
/// anew on every representation switch.
pub trait IndexResolver: Send + Sync {
    fn index_for(&self, representation_id: &str) -> Option<SharedIndex>;
}

/// Input streams joined by one scheduler.
pub struct SchedulerInputs {
    /// Chosen representation from the ABR layer; `None` until the first
    /// selection arrives.
    pub representation: watch::Receiver<Option<Representation>>,
    /// Derived seek stream (see `weir-clock`); each emission tears the
    /// inner loop down.
    pub seeks: mpsc::Receiver<ClockTick>,
    pub clock: watch::Receiver<ClockTick>,
    /// Target buffer size ahead of the playhead, in seconds.
    pub wanted_buffer_size: watch::Receiver<f64>,
    /// Level-triggered: the sink is not currently appending/removing.
    pub sink_idle: watch::Receiver<bool>,
}

enum InnerExit {
    /// Cancelled; the outer loop decides what is next.
    Rebuild,
    /// An input channel closed: the session is going away.
    InputsClosed,
    /// HTTP 412: back off, then rebuild for the same representation.
    PreconditionBackoff,
    /// `OutOfIndex` was emitted; rebuild once any input moves.
    AwaitChange,
}

/// Per-media-type segment scheduler.
///
/// Outer loop: one inner pipeline per (representation, seek) epoch, torn
/// down with its cancellation scope on every change. Inner loop: joins
/// the latest clock tick, wanted buffer size and sink idleness, projects
/// the injection window, and feeds segments to the sink one at a time.
pub struct SegmentScheduler {
    media_type: MediaType,
    adaptation: Arc<Adaptation>,
    indexes: Arc<dyn IndexResolver>,
    sink: Arc<dyn MediaSink>,
    sink_lock: Arc<SinkLock>,
    pipeline: Arc<dyn FetchPipeline>,
    observer: Arc<dyn TransferObserver>,
    events: mpsc::Sender<BufferEvent>,
    ranges: RangeMap,
}

impl SegmentScheduler {
    pub fn new(
        adaptation: Arc<Adaptation>,
        indexes: Arc<dyn IndexResolver>,
        sink: Arc<dyn MediaSink>,
        sink_lock: Arc<SinkLock>,
        pipeline: Arc<dyn FetchPipeline>,
        observer: Arc<dyn TransferObserver>,
        events: mpsc::Sender<BufferEvent>,
    ) -> Self {
        Self {
            media_type: adaptation.media_type,
            adaptation,
            indexes,
            sink,
            sink_lock,
            pipeline,
            observer,
            events,
            ranges: RangeMap::new(),
        }
    }

    /// Buffered ranges as currently known to this scheduler.
    #[must_use]
    pub fn ranges(&self) -> &RangeMap {
        &self.ranges
    }

    /// Drive the scheduler until disposal.
    pub async fn run(mut self, inputs: SchedulerInputs, cancel: CancellationToken) {
        let SchedulerInputs {
            mut representation,
            mut seeks,
            clock,
            wanted_buffer_size,
            sink_idle,
        } = inputs;

        // The seek stream seeds itself with a synthetic tick; absorb it so
        // startup does not count as a teardown.
        let _ = seeks.try_recv();
        let media_type = self.media_type;

        'outer: loop {
            if cancel.is_cancelled() {
                break;
            }

            let rep = loop {
                let current = representation.borrow_and_update().clone();
                if let Some(rep) = current {
                    break rep;
                }
                tokio::select! {
                    () = cancel.cancelled() => break 'outer,
                    changed = representation.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                    }
                }
            };

            let Some(index) = self.indexes.index_for(&rep.id) else {
                warn!(media_type = %media_type, rep = %rep.id, "no timeline index registered");
                let _ = self
                    .events
                    .send(BufferEvent::Fatal {
                        media_type,
                        message: format!("no timeline index for representation {}", rep.id),
                    })
                    .await;
                break 'outer;
            };

            let inner_cancel = cancel.child_token();
            let exit = tokio::select! {
                biased;
                () = cancel.cancelled() => break 'outer,
                changed = representation.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                    debug!(media_type = %media_type, "representation changed, rebuilding");
                    inner_cancel.cancel();
                    continue 'outer;
                }
                seek = seeks.recv() => {
                    let Some(tick) = seek else { break 'outer };
                    debug!(
                        media_type = %media_type,
                        current_time = tick.current_time,
                        "seek into unbuffered region, rebuilding"
                    );
                    inner_cancel.cancel();
                    continue 'outer;
                }
                exit = self.run_inner(
                    &rep,
                    &index,
                    clock.clone(),
                    wanted_buffer_size.clone(),
                    sink_idle.clone(),
                    &inner_cancel,
                ) => exit,
            };

            match exit {
                Ok(InnerExit::Rebuild) => {}
                Ok(InnerExit::InputsClosed) => break 'outer,
                Ok(InnerExit::PreconditionBackoff) => {
                    tokio::select! {
                        () = cancel.cancelled() => break 'outer,
                        () = tokio::time::sleep(PRECONDITION_BACKOFF) => {}
                    }
                }
                Ok(InnerExit::AwaitChange) => {
                    let mut wake = clock.clone();
                    tokio::select! {
                        () = cancel.cancelled() => break 'outer,
                        _ = representation.changed() => {}
                        _ = seeks.recv() => {}
                        _ = wake.changed() => {}
                    }
                }
                Err(err) => {
                    warn!(media_type = %self.media_type, error = %err, "scheduler terminated");
                    let _ = self
                        .events
                        .send(BufferEvent::Fatal {
                            media_type: self.media_type,
                            message: err.to_string(),
                        })
                        .await;
                    break 'outer;
                }
            }
        }
    }

    async fn run_inner(
        &mut self,
        rep: &Representation,
        index: &SharedIndex,
        mut clock: watch::Receiver<ClockTick>,
        mut wanted: watch::Receiver<f64>,
        mut sink_idle: watch::Receiver<bool>,
        cancel: &CancellationToken,
    ) -> Result<InnerExit, BufferError> {
        let mut queued: HashSet<String> = HashSet::new();
        let mut first_iteration = true;

        loop {
            if cancel.is_cancelled() {
                return Ok(InnerExit::Rebuild);
            }

            // Gate on sink idleness (level-triggered).
            while !*sink_idle.borrow_and_update() {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(InnerExit::Rebuild),
                    changed = sink_idle.changed() => {
                        if changed.is_err() {
                            return Ok(InnerExit::InputsClosed);
                        }
                    }
                }
            }

            let tick = *clock.borrow_and_update();
            let wanted_size = *wanted.borrow_and_update();

            // Resync with the sink: it may have evicted behind our back.
            let sink_ranges = RangeMap::from_untagged(&self.sink.buffered());
            if !self.ranges.equals(&sink_ranges) {
                self.ranges.intersect(&sink_ranges);
            }

            // Injection window.
            let end_diff = tick
                .duration
                .map_or(f64::INFINITY, |d| d - tick.current_time);
            let wanted_size = wanted_size.min(tick.live_gap).min(end_diff).max(0.0);

            let profile = self.media_type.profile();
            let mut padding =
                if tick.buffer_gap.is_finite() && tick.buffer_gap > profile.low_water_pad_secs {
                    tick.buffer_gap.min(profile.high_water_pad_secs)
                } else {
                    0.0
                };
            // Skip over already-buffered equal-quality data.
            if let Some(range) = self.ranges.range_at(tick.current_time) {
                if range.bitrate == rep.bitrate {
                    padding = padding.max(range.end - tick.current_time);
                }
            }

            let up = tick.current_time + padding;
            let to = up + wanted_size;

            let segments = {
                let guard = index.lock();
                guard.segments_in(&rep.id, up, to)
            };
            let mut batch = match segments {
                Ok(batch) => batch,
                Err(TimelineError::OutOfIndex { position }) => {
                    let _ = self
                        .events
                        .send(BufferEvent::OutOfIndex {
                            media_type: self.media_type,
                            position,
                        })
                        .await;
                    return Ok(InnerExit::AwaitChange);
                }
            };

            if first_iteration {
                first_iteration = false;
                if self.adaptation.effective_init_policy() != InitSegmentPolicy::None {
                    let init = {
                        let guard = index.lock();
                        guard.init_reference(&rep.id)
                    };
                    if let Some(init) = init {
                        batch.insert(0, init);
                    }
                }
            }

            batch.retain(|seg| self.wants_segment(seg, rep, &queued));

            for seg in batch {
                if cancel.is_cancelled() {
                    return Ok(InnerExit::Rebuild);
                }
                queued.insert(seg.id.clone());
                match self.fetch_and_append(rep, index, &seg, tick.current_time).await {
                    Ok(()) => {
                        queued.remove(&seg.id);
                    }
                    Err(BufferError::Fetch(FetchError::PreconditionFailed)) => {
                        queued.remove(&seg.id);
                        let _ = self
                            .events
                            .send(BufferEvent::PreconditionFailed {
                                media_type: self.media_type,
                            })
                            .await;
                        return Ok(InnerExit::PreconditionBackoff);
                    }
                    Err(err) => return Err(err),
                }
            }

            // Wait for the next joined-input change.
            tokio::select! {
                () = cancel.cancelled() => return Ok(InnerExit::Rebuild),
                changed = clock.changed() => {
                    if changed.is_err() {
                        return Ok(InnerExit::InputsClosed);
                    }
                }
                changed = wanted.changed() => {
                    if changed.is_err() {
                        return Ok(InnerExit::InputsClosed);
                    }
                }
            }
        }
    }

    /// Queued-id and rebuffering-ratio filters (init segments bypass the
    /// ratio gate: they carry no time).
    fn wants_segment(&self, seg: &SegmentRef, rep: &Representation, queued: &HashSet<String>) -> bool {
        if queued.contains(&seg.id) {
            return false;
        }
        if seg.is_init {
            return true;
        }
        let Some(end) = seg.end_seconds() else {
            return true;
        };
        let start = seg.start_seconds();
        if let Some(existing) = self.ranges.containing(start, end - start) {
            if f64::from(existing.bitrate) * BITRATE_REBUFFERING_RATIO >= f64::from(rep.bitrate) {
                return false;
            }
        }
        true
    }

    async fn fetch_and_append(
        &mut self,
        rep: &Representation,
        index: &SharedIndex,
        seg: &SegmentRef,
        position: f64,
    ) -> Result<(), BufferError> {
        let request = SegmentRequest {
            media_type: self.media_type,
            adaptation: Arc::clone(&self.adaptation),
            representation: rep.clone(),
            segment: seg.clone(),
        };

        let started = Instant::now();
        let span = RequestSpan::begin(Arc::clone(&self.observer), self.media_type, seg, started);

        let mut events = self.pipeline.fetch(request).await;
        let parsed = loop {
            let Some(event) = events.recv().await else {
                return Err(BufferError::PipelineClosed);
            };
            match event {
                Ok(FetchEvent::Progress { bytes }) => {
                    if span.is_some() {
                        self.observer.request_progress(
                            self.media_type,
                            &seg.id,
                            bytes,
                            Instant::now(),
                        );
                    }
                }
                Ok(FetchEvent::Parsed(parsed)) => break parsed,
                Err(err) => return Err(err.into()),
            }
        };
        drop(span);
        let transferred = parsed.blob.len() as u64;
        self.observer
            .transfer_completed(self.media_type, started.elapsed(), transferred);

        match self.locked_append(parsed.blob.clone()).await {
            Ok(()) => {}
            Err(SinkError::QuotaExceeded) => {
                warn!(media_type = %self.media_type, position, "quota exceeded, collecting");
                let removed = gc::collect(
                    self.sink.as_ref(),
                    &self.sink_lock,
                    &mut self.ranges,
                    position,
                )
                .await
                .map_err(BufferError::Sink)?;
                let _ = self
                    .events
                    .send(BufferEvent::Collected {
                        media_type: self.media_type,
                        removed,
                    })
                    .await;
                // Exactly one retry after collection.
                self.locked_append(parsed.blob.clone())
                    .await
                    .map_err(BufferError::Sink)?;
            }
            Err(err) => return Err(BufferError::Sink(err)),
        }

        let range = if seg.is_init {
            None
        } else if let Some(current) = parsed.current_segment {
            let timescale = f64::from(current.timescale.max(1));
            #[expect(clippy::cast_precision_loss)]
            let start = current.time as f64 / timescale;
            #[expect(clippy::cast_precision_loss)]
            let end = (current.time + current.duration) as f64 / timescale;
            self.ranges.insert(rep.bitrate, start, end);
            Some((start, end))
        } else if let Some(end) = seg.end_seconds() {
            let start = seg.start_seconds();
            self.ranges.insert(rep.bitrate, start, end);
            Some((start, end))
        } else {
            None
        };

        if !parsed.next_segments.is_empty() {
            let mut guard = index.lock();
            for next in &parsed.next_segments {
                guard.add_segment_infos(*next, parsed.current_segment);
            }
        }

        let _ = self
            .events
            .send(BufferEvent::Loaded {
                media_type: self.media_type,
                representation_id: rep.id.clone(),
                segment_id: seg.id.clone(),
                range,
            })
            .await;
        Ok(())
    }

    async fn locked_append(&self, data: bytes::Bytes) -> Result<(), SinkError> {
        let _guard = self.sink_lock.lock().await;
        // The lock serializes our own mutations; an update still in flight
        // here belongs to the sink itself. Wait on its settle signal.
        self.sink_lock.settled(self.sink.as_ref()).await;
        self.sink.append(data).await
    }
}

/// Open request span in the ABR registry.
///
/// Dropping it delivers `request_end`, so cancelled fetches keep the
/// registry consistent: exactly one end per begin.
struct RequestSpan {
    observer: Arc<dyn TransferObserver>,
    media_type: MediaType,
    id: String,
}

impl RequestSpan {
    fn begin(
        observer: Arc<dyn TransferObserver>,
        media_type: MediaType,
        seg: &SegmentRef,
        at: Instant,
    ) -> Option<Self> {
        if seg.is_init {
            return None;
        }
        let duration = seg.duration_seconds().unwrap_or(0.0);
        observer.request_begin(media_type, &seg.id, seg.start_seconds(), duration, at);
        Some(Self {
            observer,
            media_type,
            id: seg.id.clone(),
        })
    }
}

impl Drop for RequestSpan {
    fn drop(&mut self) {
        self.observer.request_end(self.media_type, &self.id);
    }
}
