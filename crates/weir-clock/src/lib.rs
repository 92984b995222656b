#![forbid(unsafe_code)]

//! Playback clock model: raw timing ticks augmented with the live gap,
//! and the derived seek stream the scheduler tears down on.

mod observer;
mod tick;

pub use observer::{spawn_seek_stream, SeekObserver, SeekObserverOptions};
pub use tick::{ClockTick, PlaybackState};
