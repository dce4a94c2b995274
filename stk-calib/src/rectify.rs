//! Row-aligning rectification of a calibrated stereo pair.
//!
//! Both cameras are rotated by half the relative rotation so they share an
//! orientation, then by a common rotation that puts the baseline on the image
//! x (or y) axis. The new focal length is the smaller of the two, shrunk for
//! barrel distortion; principal points are chosen so the image centres map
//! to the rectified centres and are shared for zero disparity at infinity.

use nalgebra::{Matrix3x4, Matrix4, Vector3};
use stk_core::coordinate::rodrigues_to_matrix;
use stk_core::{CalibrationError, CameraModel, PinholeCamera, RectificationTransforms, RigidTransform};

/// Compute `R1, R2, P1, P2, Q` for `x_right = R * x_left + T`.
pub fn stereo_rectify(
    left: &PinholeCamera,
    right: &PinholeCamera,
    stereo: &RigidTransform,
) -> Result<RectificationTransforms, CalibrationError> {
    let (nx, ny) = left.image_size();
    let (nx, ny) = (nx as f64, ny as f64);
    let translation = stereo.translation;

    let half = rodrigues_to_matrix(&(stereo.rodrigues() * -0.5));
    let t = half * translation;
    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let nt = t.norm();
    if nt <= f64::EPSILON {
        return Err(CalibrationError::Degenerate("zero stereo baseline".into()));
    }

    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).acos() / nw;
    }
    let wr = rodrigues_to_matrix(&ww);
    let r1 = wr * half.transpose();
    let r2 = wr * half;
    let t_rect = r2 * translation;

    let mut fc_new = f64::MAX;
    for camera in [left, right] {
        let (fx, fy) = camera.focal_length();
        let mut fc = if idx == 0 { fy } else { fx };
        let k1 = camera.distortion().coeffs()[0];
        if k1 < 0.0 {
            fc *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
        }
        fc_new = fc_new.min(fc);
    }

    let corners = [
        (0.0, 0.0),
        (nx - 1.0, 0.0),
        (0.0, ny - 1.0),
        (nx - 1.0, ny - 1.0),
    ];
    let mut cc = [(0.0, 0.0); 2];
    for (k, (camera, rot)) in [(left, &r1), (right, &r2)].into_iter().enumerate() {
        let (mut sx, mut sy) = (0.0, 0.0);
        for corner in corners {
            let (x, y) = camera.normalize(corner).map_err(|e| {
                CalibrationError::Degenerate(format!("cannot undistort image corner: {e}"))
            })?;
            let ray = rot * Vector3::new(x, y, 1.0);
            sx += fc_new * ray.x / ray.z;
            sy += fc_new * ray.y / ray.z;
        }
        cc[k] = ((nx - 1.0) / 2.0 - sx / 4.0, (ny - 1.0) / 2.0 - sy / 4.0);
    }
    let shared = ((cc[0].0 + cc[1].0) / 2.0, (cc[0].1 + cc[1].1) / 2.0);
    let (cx, cy) = shared;

    let p1 = Matrix3x4::new(
        fc_new, 0.0, cx, 0.0, //
        0.0, fc_new, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let mut p2 = p1;
    p2[(idx, 3)] = t_rect[idx] * fc_new;

    let q = Matrix4::new(
        1.0, 0.0, 0.0, -cx, //
        0.0, 1.0, 0.0, -cy, //
        0.0, 0.0, 0.0, fc_new, //
        0.0, 0.0, -1.0 / t_rect[idx], 0.0,
    );

    Ok(RectificationTransforms {
        r1,
        r2,
        p1,
        p2,
        q,
    })
}
