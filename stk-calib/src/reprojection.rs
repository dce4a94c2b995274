//! Parameter packing and reprojection residuals shared by both solves.

use nalgebra::{DVector, Vector3};
use stk_core::{CameraModel, CorrespondenceSet, DistortionModel, PinholeCamera, RigidTransform};

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`
pub(crate) const INTRINSIC_LEN: usize = 9;
/// `[rx, ry, rz, tx, ty, tz]`
pub(crate) const POSE_LEN: usize = 6;

/// Residual used for a point that lands behind the camera.
const BEHIND_PENALTY: f64 = 1e3;

pub(crate) fn pack_camera(camera: &PinholeCamera) -> [f64; INTRINSIC_LEN] {
    let (fx, fy) = camera.focal_length();
    let (cx, cy) = camera.principal_point();
    let d = camera.distortion().coeffs();
    [fx, fy, cx, cy, d[0], d[1], d[2], d[3], d[4]]
}

pub(crate) fn unpack_camera(p: &[f64], width: usize, height: usize) -> PinholeCamera {
    PinholeCamera::new(
        width,
        height,
        p[0],
        p[1],
        p[2],
        p[3],
        DistortionModel::from_coeffs(&[p[4], p[5], p[6], p[7], p[8]]),
    )
}

pub(crate) fn pack_pose(pose: &RigidTransform) -> [f64; POSE_LEN] {
    let r = pose.rodrigues();
    let t = pose.translation;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

pub(crate) fn unpack_pose(p: &[f64]) -> RigidTransform {
    RigidTransform::from_rodrigues(
        &Vector3::new(p[0], p[1], p[2]),
        Vector3::new(p[3], p[4], p[5]),
    )
}

/// Append `(u - u_obs, v - v_obs)` for every point of `set` seen through
/// `camera` with board pose `pose`.
pub(crate) fn push_residuals(
    out: &mut Vec<f64>,
    camera: &PinholeCamera,
    pose: &RigidTransform,
    set: &CorrespondenceSet,
) {
    for (obj, img) in set.object_points().iter().zip(set.image_points()) {
        match camera.project(&pose.apply(&obj.coords)) {
            Some((u, v)) => {
                out.push(u - img.x);
                out.push(v - img.y);
            }
            None => {
                out.push(BEHIND_PENALTY);
                out.push(BEHIND_PENALTY);
            }
        }
    }
}

/// Sum of squared pixel errors and point count for one view.
pub(crate) fn squared_error(
    camera: &PinholeCamera,
    pose: &RigidTransform,
    set: &CorrespondenceSet,
) -> (f64, usize) {
    let mut r = Vec::with_capacity(2 * set.len());
    push_residuals(&mut r, camera, pose, set);
    (r.iter().map(|v| v * v).sum(), set.len())
}

/// Per-view error: L2 norm of the pixel residuals divided by point count.
pub(crate) fn view_error(camera: &PinholeCamera, pose: &RigidTransform, set: &CorrespondenceSet) -> f64 {
    let (sq, n) = squared_error(camera, pose, set);
    if n == 0 { 0.0 } else { sq.sqrt() / n as f64 }
}

pub(crate) fn all_finite(x: &DVector<f64>) -> bool {
    x.iter().all(|v| v.is_finite())
}
