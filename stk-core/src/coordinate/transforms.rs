use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, StkError};

/// Rigid transform `x_b = R * x_a + t` between two camera/world frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Build from a Rodrigues rotation vector and a translation.
    pub fn from_rodrigues(rvec: &Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(rodrigues_to_matrix(rvec), translation)
    }

    pub fn rodrigues(&self) -> Vector3<f64> {
        matrix_to_rodrigues(&self.rotation)
    }

    pub fn apply(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self::new(rt, -(rt * self.translation))
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> Self {
        Self::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }
}

/// Rotation vector (axis * angle) to rotation matrix.
pub fn rodrigues_to_matrix(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*rvec).into_inner()
}

/// Rotation matrix to rotation vector (axis * angle).
pub fn matrix_to_rodrigues(r: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix(r).scaled_axis()
}

/// Cross-product matrix `[v]x` such that `[v]x * w == v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Closest proper rotation to `m` in the Frobenius sense.
pub fn project_to_rotation(m: &Matrix3<f64>) -> Result<Matrix3<f64>, StkError> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(StkError::Numerical("SVD failed projecting onto SO(3)".into()));
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Ok(r)
}

/// Chordal L2 mean of a set of rotations.
pub fn average_rotations(rotations: &[Matrix3<f64>]) -> Result<Matrix3<f64>, StkError> {
    if rotations.is_empty() {
        return Err(CalibrationError::Degenerate("no rotations to average".into()).into());
    }
    let sum = rotations
        .iter()
        .fold(Matrix3::zeros(), |acc: Matrix3<f64>, r| acc + r);
    project_to_rotation(&sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rodrigues_roundtrip() {
        let rvec = Vector3::new(0.1, -0.25, 0.4);
        let r = rodrigues_to_matrix(&rvec);
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(matrix_to_rodrigues(&r), rvec, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_rotation_vector_is_identity() {
        let r = rodrigues_to_matrix(&Vector3::zeros());
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_inverse_and_compose() {
        let t = RigidTransform::from_rodrigues(
            &Vector3::new(0.05, 0.2, -0.1),
            Vector3::new(-142.1, 3.0, 1.5),
        );
        let p = Vector3::new(10.0, -20.0, 500.0);

        let back = t.inverse().apply(&t.apply(&p));
        assert_relative_eq!(back, p, epsilon = 1e-9);

        let id = t.compose(&t.inverse());
        assert_relative_eq!(id.rotation, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_skew_matches_cross_product() {
        let v = Vector3::new(1.0, -2.0, 3.0);
        let w = Vector3::new(-0.5, 4.0, 2.0);
        assert_relative_eq!(skew(&v) * w, v.cross(&w), epsilon = 1e-12);
    }

    #[test]
    fn test_average_of_nearby_rotations() {
        let base = Vector3::new(0.0, 0.3, 0.0);
        let rotations = vec![
            rodrigues_to_matrix(&(base + Vector3::new(0.01, 0.0, 0.0))),
            rodrigues_to_matrix(&(base - Vector3::new(0.01, 0.0, 0.0))),
        ];
        let mean = average_rotations(&rotations).unwrap();
        assert_relative_eq!(matrix_to_rodrigues(&mean), base, epsilon = 1e-4);
    }

    #[test]
    fn test_project_to_rotation_fixes_scale() {
        let r = rodrigues_to_matrix(&Vector3::new(0.2, 0.1, -0.3));
        let projected = project_to_rotation(&(r * 3.0)).unwrap();
        assert_relative_eq!(projected, r, epsilon = 1e-12);
        assert!((projected.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_rejects_empty() {
        assert!(average_rotations(&[]).is_err());
    }
}
