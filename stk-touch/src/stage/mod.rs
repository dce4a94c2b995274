//! Filter stages of the touch pipeline.
//!
//! Every stage maps the frame's detections to a list of the same shape. The
//! pipeline runs them in the configured order and turns the survivors into
//! key state.

use std::collections::BTreeSet;

use crate::config::{PipelineConfig, StageKind};
use crate::types::{FingerId, FingerObservation, KeyState};

mod chord;
mod debounce;
mod exit_zone;
mod hysteresis;
mod smoothing;
mod spatial;

pub use chord::ChordTracker;
pub use debounce::Debounce;
pub use exit_zone::ExitZone;
pub use hysteresis::Hysteresis;
pub use smoothing::Smoothing;
pub use spatial::SpatialFilter;

/// Read-only view of the pipeline handed to every stage.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub timestamp_ms: u64,
    pub frame: u64,
    /// Key state as of the end of the previous frame.
    pub keys: &'a [KeyState],
    /// Bottom edge of the keyboard in the reference image, if known.
    pub bottom_edge_y: Option<f64>,
}

impl FrameContext<'_> {
    pub fn is_pressed(&self, key: usize) -> bool {
        self.keys.get(key).is_some_and(|s| s.pressed)
    }

    /// Milliseconds since `key` last changed state, `None` if it never did.
    pub fn since_transition(&self, key: usize) -> Option<u64> {
        let at = self.keys.get(key)?.last_transition_ms?;
        Some(self.timestamp_ms.saturating_sub(at))
    }
}

pub trait Stage: Send {
    fn kind(&self) -> StageKind;

    fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation>;

    /// Drop any history kept for `finger`.
    fn forget(&mut self, _finger: FingerId) {}

    fn reset(&mut self);

    /// Set of keys currently held, for stages that track it.
    fn chord(&self) -> Option<&BTreeSet<usize>> {
        None
    }
}

/// Instantiate one stage from its configuration section.
pub fn build(kind: StageKind, config: &PipelineConfig) -> Box<dyn Stage> {
    match kind {
        StageKind::Smoothing => Box::new(Smoothing::new(config.smoothing.window)),
        StageKind::Spatial => Box::new(SpatialFilter::new(config.spatial.min_separation_px)),
        StageKind::Hysteresis => Box::new(Hysteresis::new(config.hysteresis.clone())),
        StageKind::ExitZone => Box::new(ExitZone::new(config.exit_zone.clone())),
        StageKind::Debounce => Box::new(Debounce::new(config.debounce.cooldown_ms)),
        StageKind::Chord => Box::new(ChordTracker::default()),
    }
}
