use std::collections::HashMap;

use log::debug;

use super::{FrameContext, Stage};
use crate::config::StageKind;
use crate::types::FingerObservation;

/// Holds each key in its current state for a cooldown after every accepted
/// transition.
///
/// Within the cooldown a released key drops new detections and a pressed key
/// keeps its last detection even when the finger has gone.
#[derive(Debug)]
pub struct Debounce {
    cooldown_ms: u64,
    last: HashMap<usize, FingerObservation>,
}

impl Debounce {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last: HashMap::new(),
        }
    }

    fn cooling(&self, ctx: &FrameContext<'_>, key: usize) -> bool {
        ctx.since_transition(key)
            .is_some_and(|elapsed| elapsed < self.cooldown_ms)
    }
}

impl Stage for Debounce {
    fn kind(&self) -> StageKind {
        StageKind::Debounce
    }

    fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        let mut out: Vec<FingerObservation> = detections
            .into_iter()
            .filter(|d| {
                let Some(key) = d.key else { return true };
                let blocked = !ctx.is_pressed(key) && self.cooling(ctx, key);
                if blocked {
                    debug!("debounce: press of key {key} inside cooldown");
                }
                !blocked
            })
            .collect();

        for key in 0..ctx.keys.len() {
            let present = out.iter().any(|d| d.key == Some(key));
            if present || !ctx.is_pressed(key) || !self.cooling(ctx, key) {
                continue;
            }
            if let Some(held) = self.last.get(&key) {
                debug!("debounce: holding key {key} inside cooldown");
                out.push(held.clone());
            }
        }

        self.last.clear();
        for d in &out {
            if let Some(key) = d.key {
                self.last.insert(key, d.clone());
            }
        }
        out
    }

    fn reset(&mut self) {
        self.last.clear();
    }
}
