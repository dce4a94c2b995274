//! Camera capture for the stereo rig.
//!
//! One [`CaptureWorker`] thread per camera writes into a [`FrameSlot`]; the
//! main loop polls both slots through [`StereoCapture`].

pub mod frame;
pub mod slot;
pub mod source;
pub mod stereo;
pub mod worker;

pub use frame::{Frame, Orientation};
pub use slot::FrameSlot;
pub use source::{FrameSource, ImageSequenceSource};
pub use stereo::{JOIN_TIMEOUT, POLL_TIMEOUT, StereoCapture};
pub use worker::{CaptureSettings, CaptureWorker};
