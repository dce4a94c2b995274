//! Two-view triangulation primitives.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, RowVector4, Vector3, Vector4};
use stk_core::{GeometryInvalid, Pt2, RigidTransform};

/// Which algorithm turns a pixel pair into a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriangulationMethod {
    /// Linear triangulation on the two projection matrices.
    #[default]
    Dlt,
    /// Rectified disparity reprojected through `Q`.
    #[serde(rename = "q")]
    QMatrix,
}

impl std::str::FromStr for TriangulationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dlt" => Ok(Self::Dlt),
            "q" | "qmatrix" | "q-matrix" => Ok(Self::QMatrix),
            other => Err(format!("unknown triangulation method '{other}'")),
        }
    }
}

/// `K [R | t]`
pub fn projection_matrix(k: &Matrix3<f64>, pose: &RigidTransform) -> Matrix3x4<f64> {
    let mut rt = Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&pose.rotation);
    rt.set_column(3, &pose.translation);
    k * rt
}

/// Linear (DLT) triangulation of one point seen by two cameras.
///
/// Builds the 4×4 system from both views and takes the right singular vector
/// of `AᵀA` with the smallest singular value.
pub fn triangulate_dlt(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    x1: &Pt2,
    x2: &Pt2,
) -> Result<Vector3<f64>, GeometryInvalid> {
    let row = |p: &Matrix3x4<f64>, i: usize| -> RowVector4<f64> { p.row(i).into_owned() };
    let a = Matrix4::from_rows(&[
        row(p1, 2) * x1.y - row(p1, 1),
        row(p1, 0) - row(p1, 2) * x1.x,
        row(p2, 2) * x2.y - row(p2, 1),
        row(p2, 0) - row(p2, 2) * x2.x,
    ]);

    let svd = (a.transpose() * a).svd(false, true);
    let v_t = svd.v_t.ok_or(GeometryInvalid::PointAtInfinity)?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(GeometryInvalid::PointAtInfinity)?;
    let h: Vector4<f64> = v_t.row(smallest).transpose();

    dehomogenize(&h)
}

/// Reproject a rectified pixel and its disparity through `Q`. The result is
/// in the rectified left camera frame.
pub fn reproject_disparity(
    q: &Matrix4<f64>,
    rectified: &Pt2,
    disparity: f64,
) -> Result<Vector3<f64>, GeometryInvalid> {
    let h = q * Vector4::new(rectified.x, rectified.y, disparity, 1.0);
    dehomogenize(&h)
}

fn dehomogenize(h: &Vector4<f64>) -> Result<Vector3<f64>, GeometryInvalid> {
    if h.w.abs() <= f64::EPSILON * h.xyz().norm().max(1.0) {
        return Err(GeometryInvalid::PointAtInfinity);
    }
    let p = h.xyz() / h.w;
    if p.iter().all(|c| c.is_finite()) {
        Ok(p)
    } else {
        Err(GeometryInvalid::PointAtInfinity)
    }
}
