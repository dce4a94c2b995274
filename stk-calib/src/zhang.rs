//! Closed-form initialization: intrinsics from plane homographies and the
//! board pose of each view.

use nalgebra::{DMatrix, Matrix3, Vector3};
use stk_core::coordinate::project_to_rotation;
use stk_core::{CalibrationError, RigidTransform};

use crate::homography::null_vector;

/// `v_ij` of Zhang's constraint system with the skew term dropped:
/// unknowns are `[B11, B22, B13, B23, B33]`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 5] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

/// Zero-skew camera matrix from at least two homographies.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
) -> Result<Matrix3<f64>, CalibrationError> {
    if homographies.len() < 2 {
        return Err(CalibrationError::Degenerate(format!(
            "need at least 2 homographies, got {}",
            homographies.len()
        )));
    }

    let mut v = DMatrix::<f64>::zeros(2 * homographies.len(), 5);
    for (k, h) in homographies.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        for c in 0..5 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = v11[c] - v22[c];
        }
    }

    let b = null_vector(&v)
        .ok_or_else(|| CalibrationError::Degenerate("intrinsics SVD failed".into()))?;
    let (b11, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4]);

    if b11 * b22 <= 0.0 {
        return Err(CalibrationError::Degenerate(
            "views do not constrain the focal lengths".into(),
        ));
    }

    let v0 = -b23 / b22;
    let lambda = b33 - (b13 * b13 - v0 * b11 * b23) / b11;
    let alpha_sq = lambda / b11;
    let beta_sq = lambda / b22;
    if alpha_sq <= 0.0 || beta_sq <= 0.0 {
        return Err(CalibrationError::Degenerate(
            "homographies imply imaginary focal length".into(),
        ));
    }
    let alpha = alpha_sq.sqrt();
    let beta = beta_sq.sqrt();
    let u0 = -b13 * alpha_sq / lambda;

    Ok(Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0))
}

/// Board-to-camera pose from a plane homography, with the board in front of
/// the camera.
pub fn pose_from_homography(
    k: &Matrix3<f64>,
    h: &Matrix3<f64>,
) -> Result<RigidTransform, CalibrationError> {
    let k_inv = k
        .try_inverse()
        .ok_or_else(|| CalibrationError::Degenerate("camera matrix is singular".into()))?;

    let h1 = k_inv * h.column(0);
    let h2 = k_inv * h.column(1);
    let h3 = k_inv * h.column(2);

    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm <= f64::EPSILON {
        return Err(CalibrationError::Degenerate("homography has zero scale".into()));
    }
    let mut lambda = 1.0 / norm;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = h1 * lambda;
    let r2: Vector3<f64> = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let rotation =
        project_to_rotation(&r).map_err(|e| CalibrationError::Degenerate(e.to_string()))?;

    Ok(RigidTransform::new(rotation, h3 * lambda))
}
