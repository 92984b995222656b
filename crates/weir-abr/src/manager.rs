use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::warn;
use weir_core::{MediaType, Representation, TransferObserver};

use crate::chooser::{Choice, ChooserOptions, RepresentationChooser};

/// Multiplexes one [`RepresentationChooser`] per media type.
///
/// The manager is the sole writer to the pending-request registries: the
/// scheduler reports transfers through the [`TransferObserver`] impl and
/// never touches a chooser directly.
pub struct AbrManager {
    options: ChooserOptions,
    choosers: Mutex<HashMap<MediaType, RepresentationChooser>>,
}

impl AbrManager {
    #[must_use]
    pub fn new(options: ChooserOptions) -> Self {
        Self {
            options,
            choosers: Mutex::new(HashMap::new()),
        }
    }

    fn with_chooser<R>(
        &self,
        media_type: MediaType,
        f: impl FnOnce(&mut RepresentationChooser) -> R,
    ) -> R {
        let mut map = self.choosers.lock();
        let chooser = map
            .entry(media_type)
            .or_insert_with(|| RepresentationChooser::new(media_type, self.options));
        f(chooser)
    }

    /// Evaluate the selection for one media type.
    pub fn decide(
        &self,
        media_type: MediaType,
        representations: &[Representation],
        now: Instant,
    ) -> Option<Choice> {
        self.with_chooser(media_type, |c| c.decide(representations, now))
    }

    pub fn set_manual_bitrate(&self, media_type: MediaType, bitrate: Option<u32>) {
        self.with_chooser(media_type, |c| c.set_manual_bitrate(bitrate));
    }

    pub fn set_max_auto_bitrate(&self, media_type: MediaType, bitrate: Option<u32>) {
        self.with_chooser(media_type, |c| c.set_max_auto_bitrate(bitrate));
    }

    pub fn set_width_limit(&self, media_type: MediaType, width: Option<u32>) {
        self.with_chooser(media_type, |c| c.set_width_limit(width));
    }

    pub fn set_throttle(&self, media_type: MediaType, bitrate: Option<u32>) {
        self.with_chooser(media_type, |c| c.set_throttle(bitrate));
    }

    /// Disposal hook: drains every chooser's registry and returns the
    /// number of leaked request spans (each already logged).
    pub fn dispose(&self) -> usize {
        let mut map = self.choosers.lock();
        let mut leaked = 0;
        for (media_type, chooser) in map.iter_mut() {
            let leaks = chooser.drain_leaks();
            if !leaks.is_empty() {
                warn!(
                    media_type = %media_type,
                    count = leaks.len(),
                    "pending requests leaked at disposal"
                );
                leaked += leaks.len();
            }
        }
        leaked
    }
}

impl TransferObserver for AbrManager {
    fn request_begin(
        &self,
        media_type: MediaType,
        request_id: &str,
        segment_time_secs: f64,
        segment_duration_secs: f64,
        at: Instant,
    ) {
        self.with_chooser(media_type, |c| {
            c.request_begin(request_id, segment_time_secs, segment_duration_secs, at);
        });
    }

    fn request_progress(&self, media_type: MediaType, request_id: &str, bytes: u64, at: Instant) {
        self.with_chooser(media_type, |c| c.request_progress(request_id, bytes, at));
    }

    fn request_end(&self, media_type: MediaType, request_id: &str) {
        self.with_chooser(media_type, |c| c.request_end(request_id));
    }

    fn transfer_completed(&self, media_type: MediaType, elapsed: Duration, bytes: u64) {
        self.with_chooser(media_type, |c| c.add_estimate(elapsed, bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<Representation> {
        vec![
            Representation {
                id: "lo".into(),
                bitrate: 500_000,
                width: None,
                height: None,
                codec: "mp4a.40.2".into(),
            },
            Representation {
                id: "hi".into(),
                bitrate: 2_000_000,
                width: None,
                height: None,
                codec: "mp4a.40.2".into(),
            },
        ]
    }

    #[test]
    fn estimation_is_per_media_type() {
        let manager = AbrManager::new(ChooserOptions::default());
        let now = Instant::now();

        // Strong audio throughput must not lift the video chooser.
        manager.transfer_completed(MediaType::Audio, Duration::from_secs(1), 2_000_000);

        let audio = manager.decide(MediaType::Audio, &ladder(), now).unwrap();
        let video = manager.decide(MediaType::Video, &ladder(), now).unwrap();
        assert_eq!(audio.index, 1);
        assert_eq!(video.index, 0, "video has no samples of its own");
    }

    #[test]
    fn shared_estimation_comparison_vector() {
        // Reference vector for the per-type vs shared estimation question:
        // with shared estimation both types would pick index 1 here; the
        // per-type model keeps the silent type at its floor.
        let manager = AbrManager::new(ChooserOptions::default());
        let now = Instant::now();
        manager.transfer_completed(MediaType::Video, Duration::from_secs(1), 2_000_000);

        let video = manager.decide(MediaType::Video, &ladder(), now).unwrap();
        let text = manager.decide(MediaType::Text, &ladder(), now).unwrap();
        assert_eq!((video.index, text.index), (1, 0));
    }

    #[test]
    fn manual_setter_reaches_the_right_chooser() {
        let manager = AbrManager::new(ChooserOptions::default());
        manager.set_manual_bitrate(MediaType::Video, Some(2_000_000));
        let video = manager
            .decide(MediaType::Video, &ladder(), Instant::now())
            .unwrap();
        assert_eq!(video.index, 1);

        let audio = manager
            .decide(MediaType::Audio, &ladder(), Instant::now())
            .unwrap();
        assert_eq!(audio.index, 0);
    }

    #[test]
    fn dispose_counts_leaked_spans() {
        let manager = AbrManager::new(ChooserOptions::default());
        let now = Instant::now();
        manager.request_begin(MediaType::Video, "a", 0.0, 4.0, now);
        manager.request_begin(MediaType::Audio, "b", 0.0, 4.0, now);
        manager.request_end(MediaType::Video, "a");
        assert_eq!(manager.dispose(), 1);
        assert_eq!(manager.dispose(), 0, "already drained");
    }
}
