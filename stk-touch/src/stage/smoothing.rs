use std::collections::{HashMap, VecDeque};

use super::{FrameContext, Stage};
use crate::config::StageKind;
use crate::types::{FingerId, FingerObservation};

#[derive(Debug, Default)]
struct Track {
    window: VecDeque<f64>,
    last_raw: Option<f64>,
}

/// Rolling mean of raw depth per finger. Velocity is the difference of the
/// two most recent raw samples.
#[derive(Debug)]
pub struct Smoothing {
    window: usize,
    tracks: HashMap<FingerId, Track>,
}

impl Smoothing {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            tracks: HashMap::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.tracks.len()
    }
}

impl Stage for Smoothing {
    fn kind(&self) -> StageKind {
        StageKind::Smoothing
    }

    fn process(
        &mut self,
        mut detections: Vec<FingerObservation>,
        _ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        for d in &mut detections {
            let track = self.tracks.entry(d.finger).or_default();
            track.window.push_back(d.depth);
            while track.window.len() > self.window {
                track.window.pop_front();
            }
            d.smoothed_depth = track.window.iter().sum::<f64>() / track.window.len() as f64;
            d.velocity = track.last_raw.map_or(0.0, |prev| d.depth - prev);
            track.last_raw = Some(d.depth);
        }
        detections
    }

    fn forget(&mut self, finger: FingerId) {
        self.tracks.remove(&finger);
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }
}
