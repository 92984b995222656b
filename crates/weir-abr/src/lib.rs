#![forbid(unsafe_code)]

//! Adaptive bitrate selection.
//!
//! One [`RepresentationChooser`] per media type ingests throughput samples
//! from completed transfers and progress from in-flight requests, then
//! selects a representation under the user-imposed ceilings (manual
//! bitrate, max auto bitrate, throttling, viewport width). The
//! [`AbrManager`] multiplexes choosers by media type and is the engine's
//! [`weir_core::TransferObserver`] implementation.
//!
//! The chooser never fails: degenerate inputs (no samples, empty ceiling
//! intersection) fall back to the lowest representation.

mod chooser;
mod estimator;
mod manager;
mod registry;

pub use chooser::{Choice, ChoiceReason, ChooserOptions, RepresentationChooser};
pub use estimator::{BandwidthEstimator, EwmaBandwidthEstimator};
pub use manager::AbrManager;
pub use registry::{PendingRequestRegistry, RequestProgress};
