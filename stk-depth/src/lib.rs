//! Metric depth from a calibrated stereo pair.
//!
//! [`DepthEstimator`] rectifies frames and points through precomputed lookup
//! tables and triangulates pixel pairs. Without a usable calibration,
//! [`DepthProvider`] falls back to [`AngleTriangulator`].

pub mod estimator;
pub mod fallback;
pub mod plane;
pub mod provider;
pub mod remap;
pub mod triangulate;

pub use estimator::DepthEstimator;
pub use fallback::{AngleTriangulator, FallbackGeometry};
pub use plane::ContactPlane;
pub use provider::DepthProvider;
pub use remap::RemapTable;
pub use triangulate::TriangulationMethod;
