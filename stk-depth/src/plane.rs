use serde::{Deserialize, Serialize};
use stk_core::Pt3;

/// The surface the virtual keyboard lies on, in the depth frame
/// (centimetres). The normal points to the pressing side, so a fingertip
/// pushed into the surface has positive distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPlane {
    normal: [f64; 3],
    offset: f64,
}

impl ContactPlane {
    /// Plane `n · p = offset`. `None` for a zero normal.
    pub fn new(normal: [f64; 3], offset: f64) -> Option<Self> {
        let n = nalgebra::Vector3::from(normal);
        let len = n.norm();
        if !len.is_finite() || len <= f64::EPSILON {
            return None;
        }
        Some(Self {
            normal: (n / len).into(),
            offset: offset / len,
        })
    }

    /// Plane facing away from the camera at `depth_cm` along the optical axis.
    pub fn at_depth(depth_cm: f64) -> Self {
        Self {
            normal: [0.0, 0.0, 1.0],
            offset: depth_cm,
        }
    }

    /// Plane through three surface points, oriented so that the camera
    /// origin is on the non-pressing side.
    pub fn through(a: &Pt3, b: &Pt3, c: &Pt3) -> Option<Self> {
        let mut n = (b - a).cross(&(c - a));
        let len = n.norm();
        if len <= f64::EPSILON {
            return None;
        }
        n /= len;
        let mut offset = n.dot(&a.coords);
        if offset < 0.0 {
            n = -n;
            offset = -offset;
        }
        Some(Self {
            normal: n.into(),
            offset,
        })
    }

    /// Signed distance of `point` to the plane, positive on the pressing side.
    pub fn signed_distance(&self, point: &Pt3) -> f64 {
        nalgebra::Vector3::from(self.normal).dot(&point.coords) - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_plane_distance_is_z_offset() {
        let plane = ContactPlane::at_depth(50.0);
        assert_eq!(plane.signed_distance(&Pt3::new(4.0, -3.0, 51.5)), 1.5);
        assert_eq!(plane.signed_distance(&Pt3::new(0.0, 0.0, 48.0)), -2.0);
    }

    #[test]
    fn plane_through_points_faces_away_from_camera() {
        let plane = ContactPlane::through(
            &Pt3::new(0.0, 0.0, 40.0),
            &Pt3::new(0.0, 10.0, 40.0),
            &Pt3::new(10.0, 0.0, 40.0),
        )
        .unwrap();
        assert!((plane.signed_distance(&Pt3::new(5.0, 5.0, 42.0)) - 2.0).abs() < 1e-12);
        assert!(plane.signed_distance(&Pt3::origin()) < 0.0);
    }

    #[test]
    fn normal_is_normalised() {
        let plane = ContactPlane::new([0.0, 0.0, 2.0], 100.0).unwrap();
        assert!((plane.signed_distance(&Pt3::new(0.0, 0.0, 50.0))).abs() < 1e-12);
        assert!(ContactPlane::new([0.0; 3], 1.0).is_none());
        assert!(ContactPlane::through(&Pt3::origin(), &Pt3::origin(), &Pt3::origin()).is_none());
    }
}
