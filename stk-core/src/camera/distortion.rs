use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lens distortion applied to normalized image coordinates.
///
/// Coefficients follow the common `[k1, k2, p1, p2, k3]` ordering used by
/// persisted calibration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistortionModel {
    None,
    BrownConrady {
        k1: f64,
        k2: f64,
        p1: f64,
        p2: f64,
        k3: f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("singular Jacobian while undistorting")]
    SingularJacobian,
    #[error("undistortion did not converge")]
    NonConvergent,
}

type Result<T> = std::result::Result<T, DistortionError>;

const UNDISTORT_ITERATIONS: usize = 20;

impl DistortionModel {
    /// Build from the five persisted coefficients; all zeros maps to `None`.
    pub fn from_coeffs(coeffs: &[f64; 5]) -> Self {
        if coeffs.iter().all(|c| *c == 0.0) {
            return DistortionModel::None;
        }
        DistortionModel::BrownConrady {
            k1: coeffs[0],
            k2: coeffs[1],
            p1: coeffs[2],
            p2: coeffs[3],
            k3: coeffs[4],
        }
    }

    pub fn coeffs(&self) -> [f64; 5] {
        match *self {
            DistortionModel::None => [0.0; 5],
            DistortionModel::BrownConrady { k1, k2, p1, p2, k3 } => [k1, k2, p1, p2, k3],
        }
    }

    /// Apply distortion to normalized image coordinates
    pub fn distort(&self, x_norm: f64, y_norm: f64) -> (f64, f64) {
        match *self {
            DistortionModel::None => (x_norm, y_norm),

            DistortionModel::BrownConrady { k1, k2, p1, p2, k3 } => {
                let r2 = x_norm * x_norm + y_norm * y_norm;
                let r4 = r2 * r2;
                let r6 = r4 * r2;

                let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

                let x_dist = x_norm * radial
                    + 2.0 * p1 * x_norm * y_norm
                    + p2 * (r2 + 2.0 * x_norm * x_norm);

                let y_dist = y_norm * radial
                    + p1 * (r2 + 2.0 * y_norm * y_norm)
                    + 2.0 * p2 * x_norm * y_norm;

                (x_dist, y_dist)
            }
        }
    }

    /// Partial derivatives of [`distort`](Self::distort) at `(x, y)`, as
    /// `[[dxd/dx, dxd/dy], [dyd/dx, dyd/dy]]`.
    pub fn jacobian(&self, x: f64, y: f64) -> [[f64; 2]; 2] {
        match *self {
            DistortionModel::None => [[1.0, 0.0], [0.0, 1.0]],
            DistortionModel::BrownConrady { k1, k2, p1, p2, k3 } => {
                let r2 = x * x + y * y;
                let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
                // d(radial)/d(r2)
                let dr = k1 + r2 * (2.0 * k2 + 3.0 * k3 * r2);
                let xy = 2.0 * x * y * dr;
                [
                    [
                        radial + 2.0 * x * x * dr + 2.0 * p1 * y + 6.0 * p2 * x,
                        xy + 2.0 * p1 * x + 2.0 * p2 * y,
                    ],
                    [
                        xy + 2.0 * p1 * x + 2.0 * p2 * y,
                        radial + 2.0 * y * y * dr + 6.0 * p1 * y + 2.0 * p2 * x,
                    ],
                ]
            }
        }
    }

    /// Invert [`distort`](Self::distort) by Newton steps from the distorted
    /// point.
    pub fn undistort(&self, x_dist: f64, y_dist: f64) -> Result<(f64, f64)> {
        if matches!(self, DistortionModel::None) {
            return Ok((x_dist, y_dist));
        }

        let (mut x, mut y) = (x_dist, y_dist);
        for _ in 0..UNDISTORT_ITERATIONS {
            let (fx, fy) = self.distort(x, y);
            let (rx, ry) = (x_dist - fx, y_dist - fy);
            if rx.abs() < 1e-12 && ry.abs() < 1e-12 {
                return Ok((x, y));
            }

            let [[a, b], [c, d]] = self.jacobian(x, y);
            let det = a * d - b * c;
            if det.abs() < 1e-18 {
                return Err(DistortionError::SingularJacobian);
            }
            x += (d * rx - b * ry) / det;
            y += (a * ry - c * rx) / det;
            if !x.is_finite() || !y.is_finite() {
                return Err(DistortionError::NonConvergent);
            }
        }

        let (fx, fy) = self.distort(x, y);
        if (x_dist - fx).abs() < 1e-9 && (y_dist - fy).abs() < 1e-9 {
            Ok((x, y))
        } else {
            Err(DistortionError::NonConvergent)
        }
    }
}
