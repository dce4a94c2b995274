use std::collections::HashMap;

use log::debug;

use super::{FrameContext, Stage};
use crate::config::{HysteresisConfig, StageKind};
use crate::types::{FingerId, FingerObservation};

/// Two-threshold activation per finger and key.
///
/// A finger becomes active on a key once its depth reaches the key's press
/// threshold and stays active until depth drops below the release threshold.
/// Inactive fingers are removed from the frame.
#[derive(Debug)]
pub struct Hysteresis {
    config: HysteresisConfig,
    active: HashMap<FingerId, usize>,
}

impl Hysteresis {
    pub fn new(config: HysteresisConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
        }
    }
}

impl Stage for Hysteresis {
    fn kind(&self) -> StageKind {
        StageKind::Hysteresis
    }

    fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        let mut active = HashMap::with_capacity(detections.len());
        let survivors = detections
            .into_iter()
            .filter(|d| {
                let Some(key) = d.key else {
                    return false;
                };
                let t = self.config.thresholds(key);
                // Only count as held if a later stage did not veto the press.
                let held = self.active.get(&d.finger) == Some(&key) && ctx.is_pressed(key);
                let on = if held {
                    d.smoothed_depth >= t.release
                } else {
                    d.smoothed_depth >= t.press
                };
                if on {
                    active.insert(d.finger, key);
                } else if held {
                    debug!("hysteresis: {:?} released key {key}", d.finger);
                }
                on
            })
            .collect();
        self.active = active;
        survivors
    }

    fn forget(&mut self, finger: FingerId) {
        self.active.remove(&finger);
    }

    fn reset(&mut self) {
        self.active.clear();
    }
}
