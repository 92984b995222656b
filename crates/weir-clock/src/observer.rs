use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{ClockTick, PlaybackState};

/// A buffer gap below this is impossible in well-formed input but is
/// defensively accepted as a seek indicator.
const NEGATIVE_GAP_TOLERANCE_SECS: f64 = -2.0;

#[derive(Clone, Copy, Debug)]
pub struct SeekObserverOptions {
    /// Swallow the first matching tick, which normally corresponds to the
    /// initial programmatic seek at load time. When the player is
    /// instantiated without one, the first user seek is absorbed instead;
    /// disable this for such integrations.
    pub skip_initial_seek: bool,
}

impl Default for SeekObserverOptions {
    fn default() -> Self {
        Self {
            skip_initial_seek: true,
        }
    }
}

/// Pure seek detector over clock ticks.
///
/// Emits when the raw state is `Seeking` and the playhead left the
/// buffered region (infinite gap, or a nonsense negative gap).
#[derive(Debug)]
pub struct SeekObserver {
    options: SeekObserverOptions,
    skipped_initial: bool,
}

impl SeekObserver {
    #[must_use]
    pub fn new(options: SeekObserverOptions) -> Self {
        Self {
            options,
            skipped_initial: false,
        }
    }

    /// Whether this tick is a seek the scheduler must tear down on.
    pub fn observe(&mut self, tick: &ClockTick) -> bool {
        let out_of_buffer =
            tick.buffer_gap.is_infinite() || tick.buffer_gap < NEGATIVE_GAP_TOLERANCE_SECS;
        if tick.state != PlaybackState::Seeking || !out_of_buffer {
            return false;
        }
        if self.options.skip_initial_seek && !self.skipped_initial {
            self.skipped_initial = true;
            debug!(
                current_time = tick.current_time,
                "initial programmatic seek swallowed"
            );
            return false;
        }
        true
    }
}

/// Derive a seek stream from a clock watch channel.
///
/// The first emission is a synthetic seed tick so downstream subscribers
/// start without waiting for a real seek.
pub fn spawn_seek_stream(
    mut ticks: watch::Receiver<ClockTick>,
    options: SeekObserverOptions,
    cancel: CancellationToken,
) -> mpsc::Receiver<ClockTick> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut observer = SeekObserver::new(options);
        if tx.send(ClockTick::seed()).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = ticks.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let tick = *ticks.borrow_and_update();
                    if observer.observe(&tick) && tx.send(tick).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
