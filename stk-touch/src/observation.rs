//! Assembly of per-frame fingertip observations from tracker output.

use serde::{Deserialize, Serialize};
use stk_core::Pt2;

use crate::keyboard::KeyboardGeometry;
use crate::types::{FingerId, FingerObservation};

/// Hand-landmark indices of the five fingertips (thumb to little finger).
pub const FINGERTIPS: [u8; 5] = [4, 8, 12, 16, 20];

/// One landmark reported by the external hand tracker for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLandmark {
    pub hand_index: u8,
    pub landmark_index: u8,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

impl TrackedLandmark {
    pub fn finger(&self) -> FingerId {
        FingerId::new(self.hand_index, self.landmark_index)
    }

    pub fn pixel(&self) -> Pt2 {
        Pt2::new(self.pixel_x, self.pixel_y)
    }
}

/// Pairs fingertips across the two cameras and attaches depth and key.
pub struct ObservationBuilder<'a> {
    keyboard: &'a dyn KeyboardGeometry,
    fingertips: Vec<u8>,
}

impl<'a> ObservationBuilder<'a> {
    pub fn new(keyboard: &'a dyn KeyboardGeometry) -> Self {
        Self {
            keyboard,
            fingertips: FINGERTIPS.to_vec(),
        }
    }

    pub fn with_fingertips(mut self, landmarks: impl IntoIterator<Item = u8>) -> Self {
        self.fingertips = landmarks.into_iter().collect();
        self
    }

    /// Build the frame's observations. `depth` maps a left/right pixel pair
    /// to depth relative to the contact plane; fingertips without depth or
    /// without a partner in the right camera are skipped.
    pub fn build<F>(
        &self,
        left: &[TrackedLandmark],
        right: &[TrackedLandmark],
        depth: F,
    ) -> Vec<FingerObservation>
    where
        F: Fn(&Pt2, &Pt2) -> Option<f64>,
    {
        left.iter()
            .filter(|l| self.fingertips.contains(&l.landmark_index))
            .filter_map(|l| {
                let r = right.iter().find(|r| r.finger() == l.finger())?;
                let (pl, pr) = (l.pixel(), r.pixel());
                let depth = depth(&pl, &pr)?;
                let key = self.keyboard.key_index_at(&pl);
                Some(FingerObservation::new(l.finger(), key, depth, pl))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::KeyStrip;

    fn landmark(hand: u8, index: u8, x: f64, y: f64) -> TrackedLandmark {
        TrackedLandmark {
            hand_index: hand,
            landmark_index: index,
            pixel_x: x,
            pixel_y: y,
        }
    }

    #[test]
    fn pairs_fingertips_across_cameras() {
        let strip = KeyStrip::new(0.0, 0.0, 140.0, 50.0, 14);
        let builder = ObservationBuilder::new(&strip);
        let left = [
            landmark(0, 8, 25.0, 10.0),
            landmark(0, 6, 30.0, 30.0), // knuckle, ignored
            landmark(1, 4, 300.0, 10.0),
            landmark(1, 12, 55.0, 20.0), // no right partner
        ];
        let right = [landmark(0, 8, 5.0, 10.0), landmark(1, 4, 280.0, 10.0)];

        let out = builder.build(&left, &right, |l, r| Some(l.x - r.x));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].finger, FingerId::new(0, 8));
        assert_eq!(out[0].key, Some(2));
        assert_eq!(out[0].depth, 20.0);
        assert_eq!(out[1].key, None);
    }

    #[test]
    fn missing_depth_skips_the_finger() {
        let strip = KeyStrip::new(0.0, 0.0, 140.0, 50.0, 14);
        let builder = ObservationBuilder::new(&strip).with_fingertips([8]);
        let left = [landmark(0, 8, 25.0, 10.0), landmark(0, 4, 45.0, 10.0)];
        let right = left;
        assert!(builder.build(&left, &right, |_, _| None).is_empty());
        assert_eq!(builder.build(&left, &right, |_, _| Some(1.0)).len(), 1);
    }

    #[test]
    fn landmarks_read_from_tracker_json() {
        let l: TrackedLandmark = serde_json::from_str(
            r#"{"handIndex": 1, "landmarkIndex": 8, "pixelX": 12.5, "pixelY": 40.0}"#,
        )
        .unwrap();
        assert_eq!(l.finger(), FingerId::new(1, 8));
        assert_eq!(l.pixel(), Pt2::new(12.5, 40.0));
    }
}
