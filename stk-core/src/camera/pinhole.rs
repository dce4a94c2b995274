use super::{CameraModel, DistortionError, distortion::DistortionModel};
use nalgebra::{Matrix3, Point2, Vector3};

/// Pinhole camera model with optional Brown-Conrady distortion
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera {
    width: usize,
    height: usize,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: DistortionModel,
}

impl PinholeCamera {
    /// Create a new pinhole camera with the given distortion model
    pub fn new(
        width: usize,
        height: usize,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: DistortionModel,
    ) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            distortion,
        }
    }

    /// Create a new pinhole camera with no distortion
    pub fn new_ideal(width: usize, height: usize, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(width, height, fx, fy, cx, cy, DistortionModel::None)
    }

    /// Build from a 3x3 camera matrix and `[k1, k2, p1, p2, k3]`.
    pub fn from_matrix(width: usize, height: usize, k: &Matrix3<f64>, coeffs: &[f64; 5]) -> Self {
        Self::new(
            width,
            height,
            k[(0, 0)],
            k[(1, 1)],
            k[(0, 2)],
            k[(1, 2)],
            DistortionModel::from_coeffs(coeffs),
        )
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn distortion(&self) -> &DistortionModel {
        &self.distortion
    }

    /// Get focal lengths
    pub fn focal_length(&self) -> (f64, f64) {
        (self.fx, self.fy)
    }

    /// Get principal point
    pub fn principal_point(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    /// Distorted pixel to undistorted normalized coordinates.
    pub fn normalize(&self, pixel: (f64, f64)) -> Result<(f64, f64), DistortionError> {
        let x_dist = (pixel.0 - self.cx) / self.fx;
        let y_dist = (pixel.1 - self.cy) / self.fy;
        self.distortion.undistort(x_dist, y_dist)
    }

    /// Remove lens distortion from a pixel, keeping the same camera matrix.
    pub fn undistort_pixel(&self, pixel: &Point2<f64>) -> Result<Point2<f64>, DistortionError> {
        let (x, y) = self.normalize((pixel.x, pixel.y))?;
        Ok(Point2::new(self.fx * x + self.cx, self.fy * y + self.cy))
    }

    /// Normalized (undistorted) coordinates to distorted pixel coordinates.
    pub fn distort_normalized(&self, x_norm: f64, y_norm: f64) -> (f64, f64) {
        let (x_dist, y_dist) = self.distortion.distort(x_norm, y_norm);
        (self.fx * x_dist + self.cx, self.fy * y_dist + self.cy)
    }
}

impl CameraModel for PinholeCamera {
    fn project(&self, point_camera: &Vector3<f64>) -> Option<(f64, f64)> {
        if point_camera.z <= 0.0 {
            return None;
        }

        // Normalized coordinates
        let x_norm = point_camera.x / point_camera.z;
        let y_norm = point_camera.y / point_camera.z;

        Some(self.distort_normalized(x_norm, y_norm))
    }

    fn unproject(&self, pixel: (f64, f64)) -> Result<Vector3<f64>, DistortionError> {
        let (x_norm, y_norm) = self.normalize(pixel)?;

        // Ray in camera frame (unit vector)
        Ok(Vector3::new(x_norm, y_norm, 1.0).normalize())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinhole_ideal_projection() {
        let camera = PinholeCamera::new_ideal(1920, 1080, 1000.0, 1000.0, 960.0, 540.0);

        // Test center point
        let point = Vector3::new(0.0, 0.0, 1.0);
        let pixel = camera.project(&point).unwrap();
        assert!((pixel.0 - 960.0).abs() < 1e-6);
        assert!((pixel.1 - 540.0).abs() < 1e-6);
    }

    #[test]
    fn test_pinhole_ideal_offset_projection() {
        let camera = PinholeCamera::new_ideal(1920, 1080, 1000.0, 1000.0, 960.0, 540.0);

        let point = Vector3::new(0.5, 0.3, 1.0);
        let pixel = camera.project(&point).unwrap();
        assert!((pixel.0 - 1460.0).abs() < 1e-6); // 960 + 1000 * 0.5
        assert!((pixel.1 - 840.0).abs() < 1e-6); // 540 + 1000 * 0.3
    }

    #[test]
    fn test_pinhole_behind_camera() {
        let camera = PinholeCamera::new_ideal(1920, 1080, 1000.0, 1000.0, 960.0, 540.0);

        assert!(camera.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
        assert!(camera.project(&Vector3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_pinhole_roundtrip() {
        let camera = PinholeCamera::new_ideal(1920, 1080, 1000.0, 1000.0, 960.0, 540.0);

        let point = Vector3::new(0.5, 0.3, 2.0);
        let pixel = camera.project(&point).unwrap();
        let ray = camera.unproject(pixel).unwrap();

        let dot = ray.dot(&point.normalize());
        assert!((dot - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_undistort_pixel_inverts_projection() {
        let camera = PinholeCamera::new(
            640,
            480,
            600.0,
            610.0,
            320.0,
            240.0,
            DistortionModel::BrownConrady {
                k1: -0.12,
                k2: 0.03,
                p1: 0.0005,
                p2: -0.0008,
                k3: 0.0,
            },
        );

        let point = Vector3::new(0.21, -0.13, 1.0);
        let (u, v) = camera.project(&point).unwrap();
        let ideal = camera.undistort_pixel(&Point2::new(u, v)).unwrap();

        assert!((ideal.x - (600.0 * 0.21 + 320.0)).abs() < 1e-6);
        assert!((ideal.y - (610.0 * -0.13 + 240.0)).abs() < 1e-6);
    }

    #[test]
    fn test_camera_matrix_layout() {
        let camera = PinholeCamera::new_ideal(640, 480, 500.0, 510.0, 319.5, 239.5);
        let k = camera.camera_matrix();
        assert_eq!(k[(0, 0)], 500.0);
        assert_eq!(k[(1, 1)], 510.0);
        assert_eq!(k[(0, 2)], 319.5);
        assert_eq!(k[(1, 2)], 239.5);
        assert_eq!(k[(2, 2)], 1.0);

        let rebuilt = PinholeCamera::from_matrix(640, 480, &k, &[0.0; 5]);
        assert_eq!(rebuilt, camera);
    }

    #[test]
    fn test_pinhole_different_focal_lengths() {
        let camera = PinholeCamera::new_ideal(1920, 1080, 1000.0, 1500.0, 960.0, 540.0);

        let pixel = camera.project(&Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert!((pixel.0 - 1960.0).abs() < 1e-6);
        assert!((pixel.1 - 2040.0).abs() < 1e-6);
    }
}
