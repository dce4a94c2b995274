//! Plane-to-image homographies by normalized DLT.

use nalgebra::{DMatrix, DVector, Matrix3};
use stk_core::{CalibrationError, Pt2};

/// Unit vector minimizing `|A x|`, taken from the eigen-system of `AᵀA` so
/// that wide systems still expose their null space.
pub(crate) fn null_vector(a: &DMatrix<f64>) -> Option<DVector<f64>> {
    let ata = a.transpose() * a;
    let svd = ata.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(idx).transpose())
}

/// Similarity moving the centroid to the origin with mean distance √2.
fn normalizing_transform(points: &[Pt2]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (mx, my) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0)
}

fn apply(h: &Matrix3<f64>, p: &Pt2) -> Pt2 {
    let v = h * nalgebra::Vector3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Estimate `H` with `image ~ H * plane`.
pub fn find_homography(plane: &[Pt2], image: &[Pt2]) -> Result<Matrix3<f64>, CalibrationError> {
    let n = plane.len();
    if image.len() != n {
        return Err(CalibrationError::CorrespondenceMismatch {
            expected: n,
            got: image.len(),
        });
    }
    if n < 4 {
        return Err(CalibrationError::Degenerate(format!(
            "homography needs at least 4 points, got {n}"
        )));
    }

    let t_plane = normalizing_transform(plane);
    let t_image = normalizing_transform(image);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane.iter().zip(image).enumerate() {
        let w = apply(&t_plane, pw);
        let m = apply(&t_image, pi);
        let (x, y, u, v) = (w.x, w.y, m.x, m.y);

        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let h = null_vector(&a)
        .ok_or_else(|| CalibrationError::Degenerate("homography SVD failed".into()))?;
    let h_norm = Matrix3::from_row_slice(h.as_slice());

    let t_image_inv = t_image
        .try_inverse()
        .ok_or_else(|| CalibrationError::Degenerate("image points collapse".into()))?;
    let mut h = t_image_inv * h_norm * t_plane;

    let scale = h[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h /= scale;
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_known_homography() {
        let h_true = Matrix3::new(1.2, 0.1, 320.0, -0.05, 0.9, 240.0, 1e-4, -2e-4, 1.0);
        let plane: Vec<Pt2> = (0..6)
            .flat_map(|r| (0..7).map(move |c| Pt2::new(c as f64 * 30.0, r as f64 * 30.0)))
            .collect();
        let image: Vec<Pt2> = plane.iter().map(|p| apply(&h_true, p)).collect();

        let h = find_homography(&plane, &image).unwrap();
        for (p, q) in plane.iter().zip(&image) {
            let m = apply(&h, p);
            assert!((m - q).norm() < 1e-6);
        }
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let pts = vec![Pt2::new(0.0, 0.0), Pt2::new(1.0, 0.0), Pt2::new(0.0, 1.0)];
        assert!(matches!(
            find_homography(&pts, &pts),
            Err(CalibrationError::Degenerate(_))
        ));
    }
}
