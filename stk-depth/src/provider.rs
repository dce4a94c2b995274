use log::{info, warn};
use stk_core::{CalibrationRecord, ConfigError, Pt2, Pt3, Resolution};

use crate::estimator::DepthEstimator;
use crate::fallback::{AngleTriangulator, FallbackGeometry};
use crate::triangulate::TriangulationMethod;

/// Source of metric depth for the runtime loop.
#[derive(Debug)]
pub enum DepthProvider {
    Calibrated(Box<DepthEstimator>),
    /// Angle-based estimate from declared optics, lower precision.
    Approximate(AngleTriangulator),
}

impl DepthProvider {
    /// Pick a provider from the outcome of loading the calibration record.
    ///
    /// A missing, malformed or incomplete record degrades to
    /// [`AngleTriangulator`] instead of failing.
    pub fn select(
        loaded: Result<CalibrationRecord, ConfigError>,
        fallback: &FallbackGeometry,
        resolution: Resolution,
    ) -> Self {
        let reason = match loaded {
            Ok(record) => match DepthEstimator::new(&record) {
                Ok(estimator) => {
                    info!("using calibrated depth");
                    return Self::Calibrated(Box::new(estimator));
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        warn!(
            "{reason}; falling back to approximate depth ({}x{} deg FOV, {} cm baseline)",
            fallback.horizontal_fov_deg, fallback.vertical_fov_deg, fallback.baseline_cm
        );
        Self::Approximate(AngleTriangulator::new(fallback, resolution))
    }

    /// Triangulation method for the calibrated path. The fallback has only
    /// one method and ignores this.
    pub fn with_method(self, method: TriangulationMethod) -> Self {
        match self {
            Self::Calibrated(estimator) => Self::Calibrated(Box::new((*estimator).with_method(method))),
            approximate => approximate,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Approximate(_))
    }

    pub fn estimator(&self) -> Option<&DepthEstimator> {
        match self {
            Self::Calibrated(estimator) => Some(estimator),
            Self::Approximate(_) => None,
        }
    }

    /// Point in the left camera (or world) frame, centimetres.
    pub fn triangulate(&self, left: &Pt2, right: &Pt2) -> Option<Pt3> {
        match self {
            Self::Calibrated(estimator) => estimator.triangulate(left, right),
            Self::Approximate(triangulator) => triangulator.triangulate(left, right),
        }
    }
}
