//! Persistence for calibration records and captured frames

pub mod error;
pub mod frames;
pub mod store;

pub use error::{Result, StoreError};
pub use frames::{FrameArchive, list_images, load_gray, save_gray};
pub use store::CalibrationStore;
