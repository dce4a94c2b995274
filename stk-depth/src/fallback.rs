//! Angle-based triangulation used when no calibration is available.

use serde::{Deserialize, Serialize};
use stk_core::{FovCamera, Pt2, Pt3, Resolution};

/// Declared optics of an uncalibrated rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackGeometry {
    pub horizontal_fov_deg: f64,
    pub vertical_fov_deg: f64,
    pub baseline_cm: f64,
}

impl Default for FallbackGeometry {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 60.0,
            vertical_fov_deg: 45.0,
            baseline_cm: 14.0,
        }
    }
}

/// Parallel-camera triangulation from viewing angles:
/// `Z = B / (tan θ_left - tan θ_right)`.
///
/// Lens distortion and any rotation between the cameras are ignored, so
/// results are only approximate.
#[derive(Debug, Clone)]
pub struct AngleTriangulator {
    camera: FovCamera,
    baseline_cm: f64,
}

impl AngleTriangulator {
    pub fn new(geometry: &FallbackGeometry, resolution: Resolution) -> Self {
        Self {
            camera: FovCamera::new(
                resolution.width as usize,
                resolution.height as usize,
                geometry.horizontal_fov_deg,
                geometry.vertical_fov_deg,
            ),
            baseline_cm: geometry.baseline_cm,
        }
    }

    /// Point in the left camera frame, centimetres.
    pub fn triangulate(&self, left: &Pt2, right: &Pt2) -> Option<Pt3> {
        let (theta_l, phi_l) = self.camera.angles((left.x, left.y));
        let (theta_r, phi_r) = self.camera.angles((right.x, right.y));
        let spread = theta_l.tan() - theta_r.tan();
        if spread <= f64::EPSILON {
            return None;
        }
        let z = self.baseline_cm / spread;
        let elevation = 0.5 * (phi_l.tan() + phi_r.tan());
        Some(Pt3::new(z * theta_l.tan(), z * elevation, z))
    }
}
