use std::path::PathBuf;

use thiserror::Error;

use crate::Side;

/// Common errors across the stereo touch pipeline
#[derive(Error, Debug)]
pub enum StkError {
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Numerical error: {0}")]
    Numerical(String),
}

/// Failures of a calibration phase. Always surfaced to the operator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient views: got {got}, need at least {required}")]
    InsufficientViews { got: usize, required: usize },

    #[error("solver divergence: {0}")]
    SolverDivergence(String),

    #[error("extrinsics not computed")]
    ExtrinsicsNotComputed,

    #[error("calibration record is missing the {0} section")]
    MissingSection(&'static str),

    #[error("{0} camera intrinsics are required")]
    IntrinsicsRequired(Side),

    #[error("correspondence mismatch: expected {expected} points, got {got}")]
    CorrespondenceMismatch { expected: usize, got: usize },

    #[error("degenerate configuration: {0}")]
    Degenerate(String),
}

/// Geometrically invalid triangulation input. Expected and frequent: callers
/// treat it as "no detection this frame".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryInvalid {
    #[error("Point behind camera")]
    BehindCamera,

    #[error("Non-positive disparity")]
    NonPositiveDisparity,

    #[error("Point at infinity")]
    PointAtInfinity,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("malformed configuration: {0}")]
    Malformed(String),

    #[error("invalid parameter: {0}")]
    Invalid(String),
}

/// Camera open/read failures. Fatal for the affected camera.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("failed to open camera {camera}: {reason}")]
    Open { camera: String, reason: String },

    #[error("camera {camera} unavailable after {failures} consecutive read failures")]
    Unavailable { camera: String, failures: u32 },

    #[error("camera {0} stopped producing frames")]
    Stalled(String),
}

pub type Result<T> = std::result::Result<T, StkError>;
