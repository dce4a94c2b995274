use log::debug;

use super::{FrameContext, Stage};
use crate::config::StageKind;
use crate::types::FingerObservation;

/// Resolves several fingers on one key, or fingertips too close together to
/// be distinct, in favour of the deepest press.
#[derive(Debug)]
pub struct SpatialFilter {
    min_separation_px: f64,
}

impl SpatialFilter {
    pub fn new(min_separation_px: f64) -> Self {
        Self { min_separation_px }
    }
}

impl Stage for SpatialFilter {
    fn kind(&self) -> StageKind {
        StageKind::Spatial
    }

    fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        _ctx: &FrameContext<'_>,
    ) -> Vec<FingerObservation> {
        let mut by_depth: Vec<usize> = (0..detections.len()).collect();
        by_depth.sort_by(|&a, &b| {
            detections[b]
                .smoothed_depth
                .total_cmp(&detections[a].smoothed_depth)
        });

        let mut kept: Vec<usize> = Vec::with_capacity(detections.len());
        for i in by_depth {
            let d = &detections[i];
            let clash = kept.iter().map(|&j| &detections[j]).find(|k| {
                k.key == d.key || (k.position - d.position).norm() < self.min_separation_px
            });
            match clash {
                Some(winner) => debug!(
                    "spatial: {:?} on key {:?} yields to {:?}",
                    d.finger, d.key, winner.finger
                ),
                None => kept.push(i),
            }
        }
        kept.sort_unstable();

        let mut keep = vec![false; detections.len()];
        for i in kept {
            keep[i] = true;
        }
        detections
            .into_iter()
            .zip(keep)
            .filter_map(|(d, k)| k.then_some(d))
            .collect()
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::testing::{ctx, obs};
    use stk_core::Pt2;

    #[test]
    fn same_key_keeps_deepest_finger() {
        let mut stage = SpatialFilter::new(12.0);
        let out = stage.process(vec![obs(1, 3, 4.0), obs(2, 3, 5.0)], &ctx(0, &[]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].depth, 5.0);
        assert_eq!(out[0].finger.landmark, 2);
    }

    #[test]
    fn nearby_fingertips_collapse() {
        let mut stage = SpatialFilter::new(12.0);
        let mut a = obs(1, 3, 4.0);
        let mut b = obs(2, 4, 2.0);
        a.position = Pt2::new(100.0, 100.0);
        b.position = Pt2::new(105.0, 103.0);
        let c = obs(3, 6, 1.0);
        let out = stage.process(vec![b, a, c], &ctx(0, &[]));
        let keys: Vec<_> = out.iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![Some(3), Some(6)]);
    }

    #[test]
    fn distinct_keys_pass_in_input_order() {
        let mut stage = SpatialFilter::new(12.0);
        let out = stage.process(
            vec![obs(1, 1, 1.0), obs(2, 2, 3.0), obs(3, 3, 2.0)],
            &ctx(0, &[]),
        );
        let keys: Vec<_> = out.iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![Some(1), Some(2), Some(3)]);
    }
}
