use std::path::PathBuf;

use stk_core::{ConfigError, StkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("calibration record not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("record is not ready for this phase: {0}")]
    Incomplete(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io { path, source }
        }
    }
}

impl From<StoreError> for ConfigError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => ConfigError::Missing(path),
            StoreError::Incomplete(msg) => ConfigError::Invalid(msg),
            other => ConfigError::Malformed(other.to_string()),
        }
    }
}

impl From<StoreError> for StkError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::Json { .. } | StoreError::Incomplete(_) => {
                StkError::Config(err.into())
            }
            other => StkError::Io(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
