//! Camera models for the stereo rig and the uncalibrated fallback.

mod distortion;
mod fov;
mod pinhole;

pub use distortion::{DistortionError, DistortionModel};
pub use fov::FovCamera;
pub use pinhole::PinholeCamera;

use nalgebra::Vector3;

/// A camera that maps points in its own frame to pixels and back.
pub trait CameraModel {
    /// Pixel of a point given in camera coordinates (millimetres), or `None`
    /// when the point is not in front of the camera.
    fn project(&self, point_camera: &Vector3<f64>) -> Option<(f64, f64)>;

    /// Unit viewing ray through a pixel.
    fn unproject(&self, pixel: (f64, f64)) -> Result<Vector3<f64>, DistortionError>;

    /// `(width, height)` the model was calibrated at.
    fn image_size(&self) -> (usize, usize);
}
