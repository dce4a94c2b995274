use super::{CameraModel, DistortionError};
use nalgebra::Vector3;

/// Camera described only by its declared field of view.
///
/// Used when no calibration is available: pixels map to viewing angles
/// linearly in tangent space around the image centre.
#[derive(Debug, Clone, PartialEq)]
pub struct FovCamera {
    width: usize,
    height: usize,
    tan_half_h: f64,
    tan_half_v: f64,
}

impl FovCamera {
    /// Create from horizontal and vertical field of view in degrees.
    pub fn new(width: usize, height: usize, hfov_deg: f64, vfov_deg: f64) -> Self {
        Self {
            width,
            height,
            tan_half_h: (hfov_deg.to_radians() * 0.5).tan(),
            tan_half_v: (vfov_deg.to_radians() * 0.5).tan(),
        }
    }

    fn half_extent(&self) -> (f64, f64) {
        (self.width as f64 * 0.5, self.height as f64 * 0.5)
    }

    /// Horizontal and vertical viewing angle (radians) of a pixel.
    pub fn angles(&self, pixel: (f64, f64)) -> (f64, f64) {
        let (hw, hh) = self.half_extent();
        let tx = (pixel.0 - hw) / hw * self.tan_half_h;
        let ty = (pixel.1 - hh) / hh * self.tan_half_v;
        (tx.atan(), ty.atan())
    }

    /// Equivalent focal lengths in pixels.
    pub fn focal_length(&self) -> (f64, f64) {
        let (hw, hh) = self.half_extent();
        (hw / self.tan_half_h, hh / self.tan_half_v)
    }
}

impl CameraModel for FovCamera {
    fn project(&self, point_camera: &Vector3<f64>) -> Option<(f64, f64)> {
        if point_camera.z <= 0.0 {
            return None;
        }
        let (hw, hh) = self.half_extent();
        let u = hw + point_camera.x / point_camera.z / self.tan_half_h * hw;
        let v = hh + point_camera.y / point_camera.z / self.tan_half_v * hh;
        Some((u, v))
    }

    fn unproject(&self, pixel: (f64, f64)) -> Result<Vector3<f64>, DistortionError> {
        let (ax, ay) = self.angles(pixel);
        Ok(Vector3::new(ax.tan(), ay.tan(), 1.0).normalize())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_pixel_looks_straight_ahead() {
        let cam = FovCamera::new(640, 480, 60.0, 45.0);
        let (ax, ay) = cam.angles((320.0, 240.0));
        assert!(ax.abs() < 1e-12);
        assert!(ay.abs() < 1e-12);
    }

    #[test]
    fn image_edge_is_half_fov() {
        let cam = FovCamera::new(640, 480, 60.0, 45.0);
        let (ax, _) = cam.angles((640.0, 240.0));
        assert!((ax.to_degrees() - 30.0).abs() < 1e-9);
        let (_, ay) = cam.angles((320.0, 0.0));
        assert!((ay.to_degrees() + 22.5).abs() < 1e-9);
    }

    #[test]
    fn project_unproject_roundtrip() {
        let cam = FovCamera::new(640, 480, 70.0, 50.0);
        let p = Vector3::new(0.1, -0.2, 1.5);
        let px = cam.project(&p).unwrap();
        let ray = cam.unproject(px).unwrap();
        assert!((ray.dot(&p.normalize()) - 1.0).abs() < 1e-12);
    }
}
