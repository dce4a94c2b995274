use serde::{Deserialize, Serialize};
use stk_core::Pt2;

/// Identity of a tracked fingertip: hand index and landmark index as
/// reported by the hand tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FingerId {
    pub hand: u8,
    pub landmark: u8,
}

impl FingerId {
    pub fn new(hand: u8, landmark: u8) -> Self {
        Self { hand, landmark }
    }
}

/// One fingertip in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerObservation {
    pub finger: FingerId,
    /// Candidate virtual key under the fingertip.
    pub key: Option<usize>,
    /// Raw depth relative to the contact plane, positive when pressing.
    pub depth: f64,
    /// Depth used for threshold decisions. Equal to `depth` unless a
    /// smoothing stage replaced it.
    pub smoothed_depth: f64,
    /// Depth change per frame.
    pub velocity: f64,
    /// Fingertip pixel in the reference (left) camera.
    pub position: Pt2,
}

impl FingerObservation {
    pub fn new(finger: FingerId, key: Option<usize>, depth: f64, position: Pt2) -> Self {
        Self {
            finger,
            key,
            depth,
            smoothed_depth: depth,
            velocity: 0.0,
            position,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Pressed flag of one virtual key and when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyState {
    pub pressed: bool,
    pub last_transition_ms: Option<u64>,
}

/// Edge events produced by one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameEvents {
    pub timestamp_ms: u64,
    /// Keys that went down this frame.
    pub on_map: Vec<bool>,
    /// Keys that came up this frame.
    pub off_map: Vec<bool>,
}

impl FrameEvents {
    pub(crate) fn empty(timestamp_ms: u64, key_count: usize) -> Self {
        Self {
            timestamp_ms,
            on_map: vec![false; key_count],
            off_map: vec![false; key_count],
        }
    }

    pub fn pressed(&self) -> Vec<usize> {
        flagged(&self.on_map)
    }

    pub fn released(&self) -> Vec<usize> {
        flagged(&self.off_map)
    }

    pub fn is_empty(&self) -> bool {
        !self.on_map.iter().chain(&self.off_map).any(|&f| f)
    }
}

fn flagged(map: &[bool]) -> Vec<usize> {
    map.iter()
        .enumerate()
        .filter_map(|(i, &f)| f.then_some(i))
        .collect()
}
