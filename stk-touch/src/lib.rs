//! Key press detection from noisy fingertip depth.
//!
//! A [`TouchPipeline`] runs a configurable chain of [`Stage`]s over each
//! frame's [`FingerObservation`]s and reports press/release edges per
//! virtual key.

pub mod config;
pub mod keyboard;
pub mod observation;
pub mod pipeline;
pub mod stage;
pub mod types;

pub use config::{PipelineConfig, StageKind, Thresholds};
pub use keyboard::{KeyStrip, KeyboardGeometry};
pub use observation::{ObservationBuilder, TrackedLandmark};
pub use pipeline::TouchPipeline;
pub use stage::{FrameContext, Stage};
pub use types::{FingerId, FingerObservation, FrameEvents, KeyState};
