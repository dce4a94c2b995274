pub mod board;
pub mod camera;
pub mod coordinate;
pub mod error;
pub mod logger;
pub mod record;
pub mod types;

pub use board::{BoardGeometry, CorrespondenceSet};
pub use camera::{CameraModel, DistortionModel, FovCamera, PinholeCamera};
pub use coordinate::RigidTransform;
pub use error::{CalibrationError, ConfigError, DeviceError, GeometryInvalid, Result, StkError};
pub use record::{
    CalibrationRecord, CalibrationSummary, CameraIds, CameraIntrinsics, RectificationTransforms,
    StereoExtrinsics,
};
pub use types::{Pt2, Pt3, Resolution, Side};
