//! Checkerboard calibration of a stereo camera pair.
//!
//! Phase 1 solves each camera's intrinsics from board views
//! ([`CameraCalibrator`]); phase 2 solves the relative pose with those
//! intrinsics held fixed and derives rectification ([`StereoCalibrator`]).

pub mod camera_calibrator;
pub mod chessboard;
pub mod homography;
pub mod rectify;
mod reprojection;
pub mod settings;
pub mod solver;
pub mod stereo_calibrator;
pub mod synthetic;
pub mod zhang;

pub use camera_calibrator::{CameraCalibrator, IntrinsicSolution, calibrate_views};
pub use chessboard::{BoardDetection, ChessboardFinder, FinderParams};
pub use rectify::stereo_rectify;
pub use settings::CalibrationSettings;
pub use stereo_calibrator::{PairDetection, StereoCalibrator, StereoPair, calibrate_pairs};
