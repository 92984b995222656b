#![forbid(unsafe_code)]

//! Buffered range map: a sorted, disjoint set of media-time intervals,
//! each tagged with the bitrate the data was loaded at.
//!
//! The map mirrors what the engine believes it has pushed into the media
//! sink. It is resynced against the sink's own ranges on every tick
//! (`intersect`), because the sink may evict under memory pressure without
//! telling anyone.

mod map;

pub use map::{BufferedRange, RangeMap, EPSILON};
