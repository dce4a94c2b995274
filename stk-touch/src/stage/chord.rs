use std::collections::BTreeSet;

use super::{FrameContext, Stage};
use crate::config::StageKind;
use crate::types::FingerObservation;

/// Records which keys are held across all fingers. Never filters.
#[derive(Debug, Default)]
pub struct ChordTracker {
    active: BTreeSet<usize>,
}

impl Stage for ChordTracker {
    fn kind(&self) -> StageKind {
        StageKind::Chord
    }

    fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        _ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        self.active = detections.iter().filter_map(|d| d.key).collect();
        detections
    }

    fn reset(&mut self) {
        self.active.clear();
    }

    fn chord(&self) -> Option<&BTreeSet<usize>> {
        Some(&self.active)
    }
}
