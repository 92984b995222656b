/// Coarse playback state derived from the media element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Loading,
    Loaded,
    Playing,
    Paused,
    Seeking,
    Stalled,
    Ended,
}

/// One observation of the playback clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockTick {
    /// Playhead position in seconds.
    pub current_time: f64,
    /// Distance to the end of the buffered range containing the playhead;
    /// `+inf` when no range covers it.
    pub buffer_gap: f64,
    /// Distance to the live edge; `+inf` for on-demand content.
    pub live_gap: f64,
    /// Total duration when known.
    pub duration: Option<f64>,
    /// Media element readiness (0..=4).
    pub ready_state: u8,
    pub state: PlaybackState,
}

impl ClockTick {
    /// Synthetic tick used to seed new subscribers before the first real
    /// observation arrives.
    #[must_use]
    pub fn seed() -> Self {
        Self {
            current_time: 0.0,
            buffer_gap: f64::INFINITY,
            live_gap: f64::INFINITY,
            duration: None,
            ready_state: 0,
            state: PlaybackState::Loading,
        }
    }

    /// Augment a raw tick with the live gap derived from the manifest's
    /// maximum buffer position (`None` for on-demand content).
    #[must_use]
    pub fn with_live_gap(mut self, max_buffer_position: Option<f64>) -> Self {
        self.live_gap =
            max_buffer_position.map_or(f64::INFINITY, |max| max - self.current_time);
        self
    }
}

impl Default for ClockTick {
    fn default() -> Self {
        Self::seed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_gap_is_infinite_for_vod() {
        let tick = ClockTick::seed().with_live_gap(None);
        assert_eq!(tick.live_gap, f64::INFINITY);
    }

    #[test]
    fn live_gap_measures_distance_to_edge() {
        let tick = ClockTick {
            current_time: 95.0,
            ..ClockTick::seed()
        }
        .with_live_gap(Some(100.0));
        assert_eq!(tick.live_gap, 5.0);
    }
}
