use std::collections::HashMap;

use log::debug;

use super::{FrameContext, Stage};
use crate::config::{ExitZoneConfig, StageKind};
use crate::types::{FingerId, FingerObservation};

#[derive(Debug, Clone)]
struct Track {
    last: FingerObservation,
    /// Vertical pixel motion since the previous frame, positive downwards.
    dy: f64,
}

/// Delays releases caused by a finger sliding off the keyboard's bottom
/// edge.
///
/// When a finger holding a key disappears while moving down inside the band
/// above the bottom edge, its last detection is replayed until the grace
/// period has passed.
#[derive(Debug)]
pub struct ExitZone {
    config: ExitZoneConfig,
    tracks: HashMap<FingerId, Track>,
    /// Fingers being replayed, with the time they vanished.
    held_since: HashMap<FingerId, u64>,
}

impl ExitZone {
    pub fn new(config: ExitZoneConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            held_since: HashMap::new(),
        }
    }

    fn zone_top(&self, ctx: &FrameContext<'_>) -> Option<f64> {
        let bottom = self.config.bottom_edge_y.or(ctx.bottom_edge_y)?;
        Some(bottom - self.config.margin_px)
    }

    fn exiting(&self, track: &Track, ctx: &FrameContext<'_>) -> bool {
        let holding_key = track.last.key.is_some_and(|k| ctx.is_pressed(k));
        let in_zone = self
            .zone_top(ctx)
            .is_some_and(|top| track.last.position.y >= top);
        holding_key && in_zone && track.dy > 0.0
    }
}

impl Stage for ExitZone {
    fn kind(&self) -> StageKind {
        StageKind::ExitZone
    }

    fn process(
        &mut self,
        mut detections: Vec<FingerObservation>,
        ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        let previous = std::mem::take(&mut self.tracks);

        for d in &detections {
            self.held_since.remove(&d.finger);
            let dy = previous
                .get(&d.finger)
                .map_or(0.0, |t| d.position.y - t.last.position.y);
            self.tracks.insert(
                d.finger,
                Track {
                    last: d.clone(),
                    dy,
                },
            );
        }

        for (finger, track) in previous {
            if self.tracks.contains_key(&finger) {
                continue;
            }
            let since = match self.held_since.get(&finger) {
                Some(&since) => since,
                None if self.exiting(&track, ctx) => {
                    debug!("exit zone: holding {finger:?} after downward exit");
                    self.held_since.insert(finger, ctx.timestamp_ms);
                    ctx.timestamp_ms
                }
                None => continue,
            };
            if ctx.timestamp_ms.saturating_sub(since) < self.config.grace_ms {
                detections.push(track.last.clone());
                self.tracks.insert(finger, track);
            } else {
                self.held_since.remove(&finger);
            }
        }
        detections
    }

    fn forget(&mut self, finger: FingerId) {
        self.tracks.remove(&finger);
        self.held_since.remove(&finger);
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.held_since.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyState;
    use stk_core::Pt2;

    const PRESSED: [KeyState; 1] = [KeyState {
        pressed: true,
        last_transition_ms: Some(0),
    }];

    fn ctx(timestamp_ms: u64) -> FrameContext<'static> {
        FrameContext {
            timestamp_ms,
            frame: 0,
            keys: &PRESSED,
            bottom_edge_y: Some(400.0),
        }
    }

    fn at(y: f64) -> FingerObservation {
        FingerObservation::new(FingerId::new(0, 8), Some(0), 3.0, Pt2::new(50.0, y))
    }

    fn stage() -> ExitZone {
        ExitZone::new(ExitZoneConfig {
            margin_px: 20.0,
            grace_ms: 100,
            ..ExitZoneConfig::default()
        })
    }

    #[test]
    fn downward_exit_is_held_for_grace_period() {
        let mut z = stage();
        z.process(vec![at(380.0)], &ctx(0));
        z.process(vec![at(392.0)], &ctx(30));
        assert_eq!(z.process(vec![], &ctx(60)).len(), 1);
        assert_eq!(z.process(vec![], &ctx(120)).len(), 1);
        assert!(z.process(vec![], &ctx(160)).is_empty());
    }

    #[test]
    fn lifting_inside_the_zone_releases_at_once() {
        let mut z = stage();
        z.process(vec![at(395.0)], &ctx(0));
        z.process(vec![at(390.0)], &ctx(30));
        assert!(z.process(vec![], &ctx(60)).is_empty());
    }

    #[test]
    fn exit_above_the_zone_releases_at_once() {
        let mut z = stage();
        z.process(vec![at(300.0)], &ctx(0));
        z.process(vec![at(320.0)], &ctx(30));
        assert!(z.process(vec![], &ctx(60)).is_empty());
    }
}
