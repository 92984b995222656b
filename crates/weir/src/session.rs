use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use weir_abr::{AbrManager, ChooserOptions};
use weir_buffer::{
    BufferEvent, FetchPipeline, MediaSink, SchedulerInputs, SegmentScheduler, SinkLock,
};
use weir_clock::{spawn_seek_stream, ClockTick, SeekObserverOptions};
use weir_core::{MediaType, Representation, SinkKind, TransferObserver};

use crate::{
    events::{EventBus, WeirEvent},
    manifest::Manifest,
    options::PlayerOptions,
};

/// IO bundle a session drives: the shared native sink, its mutation
/// lock, the sink-idle signal and the fetch+parse pipeline.
///
/// The sink adapter owns both signals: it keeps `sink_idle` at `true`
/// whenever no append/remove is in flight, and calls
/// [`SinkLock::notify_settled`] on every sink `update` event so waiting
/// mutators wake without polling.
#[derive(Clone)]
pub struct SessionIo {
    pub sink: Arc<dyn MediaSink>,
    pub sink_lock: Arc<SinkLock>,
    pub sink_idle: watch::Receiver<bool>,
    pub pipeline: Arc<dyn FetchPipeline>,
}

/// One playback session: spawns a scheduler per buffered media type,
/// runs the ABR evaluation loop, and owns the disposal lifecycle.
pub struct Session {
    options: PlayerOptions,
    manifest: Arc<Manifest>,
    abr: Arc<AbrManager>,
    events: EventBus,
    cancel: CancellationToken,
    clock_tx: watch::Sender<ClockTick>,
    wanted_tx: watch::Sender<f64>,
    handles: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start scheduling against the first period of `manifest`.
    #[must_use]
    pub fn start(manifest: Arc<Manifest>, options: PlayerOptions, io: SessionIo) -> Self {
        let events = EventBus::new(options.event_capacity);
        let abr = Arc::new(AbrManager::new(ChooserOptions::default()));
        let cancel = CancellationToken::new();

        abr.set_max_auto_bitrate(MediaType::Audio, options.max_audio_bitrate);
        abr.set_max_auto_bitrate(MediaType::Video, options.max_video_bitrate);
        // Initial bitrates seed the estimator so the first automatic
        // selection lands near them instead of at the floor.
        for (ty, initial) in [
            (MediaType::Audio, options.initial_audio_bitrate),
            (MediaType::Video, options.initial_video_bitrate),
        ] {
            if let Some(bitrate) = initial {
                abr.transfer_completed(ty, Duration::from_secs(1), u64::from(bitrate) / 8);
            }
        }

        let (clock_tx, _) = watch::channel(ClockTick::seed());
        let (wanted_tx, wanted_rx) = watch::channel(options.effective_buffer_ahead());

        let mut handles = Vec::new();
        let Some(period) = manifest.periods().first() else {
            info!("manifest has no periods, nothing to schedule");
            return Self {
                options,
                manifest,
                abr,
                events,
                cancel,
                clock_tx,
                wanted_tx,
                handles,
            };
        };

        for adaptation in &period.adaptations {
            let media_type = adaptation.media_type;
            if media_type.profile().sink_kind != SinkKind::Native {
                // Text/image rendering happens outside the native sink;
                // out of this session's scope.
                debug!(media_type = %media_type, "skipping side-rendered adaptation");
                continue;
            }

            let (rep_tx, rep_rx) = watch::channel(None::<Representation>);

            handles.push(tokio::spawn(abr_loop(
                Arc::clone(&abr),
                media_type,
                adaptation.representations.clone(),
                clock_tx.subscribe(),
                rep_tx,
                events.clone(),
                cancel.clone(),
            )));

            let seeks = spawn_seek_stream(
                clock_tx.subscribe(),
                SeekObserverOptions {
                    skip_initial_seek: options.skip_initial_seek,
                },
                cancel.clone(),
            );

            let (buffer_tx, buffer_rx) = mpsc::channel(64);
            handles.push(tokio::spawn(forward_buffer_events(
                buffer_rx,
                events.clone(),
            )));

            let scheduler = SegmentScheduler::new(
                Arc::clone(adaptation),
                manifest.resolver_for(&period.id, adaptation),
                Arc::clone(&io.sink),
                Arc::clone(&io.sink_lock),
                Arc::clone(&io.pipeline),
                Arc::clone(&abr) as Arc<dyn TransferObserver>,
                buffer_tx,
            );
            let inputs = SchedulerInputs {
                representation: rep_rx,
                seeks,
                clock: clock_tx.subscribe(),
                wanted_buffer_size: wanted_rx.clone(),
                sink_idle: io.sink_idle.clone(),
            };
            handles.push(tokio::spawn(scheduler.run(inputs, cancel.clone())));
        }

        Self {
            options,
            manifest,
            abr,
            events,
            cancel,
            clock_tx,
            wanted_tx,
            handles,
        }
    }

    /// Feed a raw timing tick; the live gap is derived here from the
    /// manifest before fan-out.
    pub fn push_tick(&self, tick: ClockTick) {
        let augmented = tick.with_live_gap(self.manifest.max_buffer_position());
        let _ = self.clock_tx.send(augmented);
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WeirEvent> {
        self.events.subscribe()
    }

    /// Manual bitrate ceiling; a negative value re-enables auto.
    pub fn set_manual_bitrate(&self, media_type: MediaType, bitrate: i64) {
        self.abr
            .set_manual_bitrate(media_type, u32::try_from(bitrate).ok());
    }

    /// Auto-selection ceiling; a negative value lifts it.
    pub fn set_max_auto_bitrate(&self, media_type: MediaType, bitrate: i64) {
        self.abr
            .set_max_auto_bitrate(media_type, u32::try_from(bitrate).ok());
    }

    /// Report the current viewport width. Only effective with
    /// `limit_video_width`.
    pub fn set_viewport_width(&self, width: u32) {
        if self.options.limit_video_width {
            self.abr.set_width_limit(MediaType::Video, Some(width));
        }
    }

    /// Report page visibility. With `throttle_when_hidden`, hiding the
    /// page throttles video to the lowest representation.
    pub fn set_page_hidden(&self, hidden: bool) {
        if self.options.throttle_when_hidden {
            self.abr
                .set_throttle(MediaType::Video, hidden.then_some(0));
        }
    }

    /// Adjust the buffering target at runtime (still capped by
    /// `max_buffer_ahead`).
    pub fn set_wanted_buffer_ahead(&self, seconds: f64) {
        let _ = self
            .wanted_tx
            .send(seconds.min(self.options.max_buffer_ahead).max(0.0));
    }

    /// Tear everything down: cancel all loops, wait for them, and check
    /// the request registries for leaked spans. Returns the leak count.
    pub async fn dispose(self) -> usize {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        let leaked = self.abr.dispose();
        self.events.publish(WeirEvent::Disposed {
            leaked_requests: leaked,
        });
        info!(leaked, "session disposed");
        leaked
    }
}

/// Re-evaluate the representation choice on every clock tick and publish
/// emitted selections to the scheduler.
async fn abr_loop(
    abr: Arc<AbrManager>,
    media_type: MediaType,
    representations: Vec<Representation>,
    mut clock: watch::Receiver<ClockTick>,
    rep_tx: watch::Sender<Option<Representation>>,
    events: EventBus,
    cancel: CancellationToken,
) {
    let mut last_sent: Option<String> = None;
    loop {
        if let Some(choice) = abr.decide(media_type, &representations, Instant::now()) {
            if choice.emit {
                let rep = representations[choice.index].clone();
                events.publish(WeirEvent::RepresentationChanged {
                    media_type,
                    representation_id: rep.id.clone(),
                    bitrate: rep.bitrate,
                });
                // Stability re-emissions keep the bus fresh, but only a
                // genuinely different selection may reach the scheduler:
                // every watch change tears its pipeline down.
                if last_sent.as_deref() != Some(rep.id.as_str()) {
                    last_sent = Some(rep.id.clone());
                    if rep_tx.send(Some(rep)).is_err() {
                        return;
                    }
                }
            }
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            changed = clock.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

async fn forward_buffer_events(mut rx: mpsc::Receiver<BufferEvent>, events: EventBus) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            BufferEvent::Loaded {
                media_type,
                segment_id,
                range,
                ..
            } => WeirEvent::SegmentLoaded {
                media_type,
                segment_id,
                range,
            },
            BufferEvent::PreconditionFailed { media_type } => {
                WeirEvent::PreconditionFailed { media_type }
            }
            BufferEvent::OutOfIndex {
                media_type,
                position,
            } => WeirEvent::ManifestRefreshNeeded {
                media_type,
                position,
            },
            BufferEvent::Collected {
                media_type,
                removed,
            } => WeirEvent::BufferCollected {
                media_type,
                removed,
            },
            BufferEvent::Fatal {
                media_type,
                message,
            } => WeirEvent::FatalError {
                media_type,
                message,
            },
        };
        events.publish(mapped);
    }
}
