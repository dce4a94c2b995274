use serde::{Deserialize, Serialize};

/// Minimum views before a single-camera solve is attempted.
pub const MIN_IMAGES: usize = 15;
/// Views an operator is asked to collect.
pub const RECOMMENDED_IMAGES: usize = 25;
/// Captures beyond this count are refused.
pub const MAX_IMAGES: usize = 30;
/// Minimum simultaneous pairs for the stereo solve.
pub const MIN_STEREO_PAIRS: usize = 8;
/// Pairs beyond this count are refused to bound solve time.
pub const MAX_STEREO_PAIRS: usize = 15;
/// Reprojection error above which a calibration is flagged for recapture.
pub const MAX_REPROJECTION_ERROR: f64 = 1.0;

/// Tunables for both calibration phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationSettings {
    pub min_images: usize,
    pub max_images: usize,
    pub min_pairs: usize,
    pub max_pairs: usize,
    pub max_reprojection_error: f64,
    /// Mean error (px) above which an unconverged solve counts as diverged.
    pub divergence_error: f64,
    pub max_solver_iterations: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_images: MIN_IMAGES,
            max_images: MAX_IMAGES,
            min_pairs: MIN_STEREO_PAIRS,
            max_pairs: MAX_STEREO_PAIRS,
            max_reprojection_error: MAX_REPROJECTION_ERROR,
            divergence_error: 5.0,
            max_solver_iterations: 200,
        }
    }
}
