#![forbid(unsafe_code)]

//! Shared data model for the weir media buffer engine.
//!
//! Everything the control loops agree on lives here: rational media time,
//! the closed media-type set with its per-type buffering profile, and the
//! segment / representation / adaptation model. No I/O, no channels.

mod media_type;
mod observer;
mod segment;
mod time;

pub use media_type::{InitSegmentPolicy, MediaType, SinkKind, TypeProfile};
pub use observer::{NullTransferObserver, TransferObserver};
pub use segment::{Adaptation, Representation, SegmentRef, SegmentTiming};
pub use time::MediaTime;
