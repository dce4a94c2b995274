use stk_core::Pt2;
use stk_touch::stage::SpatialFilter;
use stk_touch::{
    FingerId, FingerObservation, FrameContext, KeyStrip, PipelineConfig, Stage, TouchPipeline,
};

const FRAME_MS: u64 = 33;

fn index_finger(key: usize, depth: f64) -> FingerObservation {
    FingerObservation::new(FingerId::new(0, 8), Some(key), depth, Pt2::new(120.0, 200.0))
}

fn config(press: f64, release: f64, cooldown_ms: u64) -> PipelineConfig {
    let mut config = PipelineConfig {
        key_count: 8,
        ..PipelineConfig::default()
    };
    config.smoothing.enabled = false;
    config.hysteresis.press_threshold = press;
    config.hysteresis.release_threshold = release;
    config.debounce.cooldown_ms = cooldown_ms;
    config
}

#[test]
fn scenario_c_press_and_release_edges() {
    let mut pipeline = TouchPipeline::new(config(3.0, 2.0, 0)).unwrap();
    let depths = [1.0, 1.0, 2.0, 4.0, 4.0, 1.0];

    let events: Vec<_> = depths
        .iter()
        .enumerate()
        .map(|(i, &d)| pipeline.process(vec![index_finger(5, d)], i as u64 * FRAME_MS))
        .collect();

    for (i, e) in events.iter().enumerate() {
        let expect_on = i == 3;
        let expect_off = i == 5;
        assert_eq!(e.on_map[5], expect_on, "frame {i}");
        assert_eq!(e.off_map[5], expect_off, "frame {i}");
        assert_eq!(e.pressed().len(), usize::from(expect_on));
        assert_eq!(e.released().len(), usize::from(expect_off));
    }
}

#[test]
fn scenario_d_two_fingers_on_one_key() {
    let a = FingerObservation::new(FingerId::new(0, 8), Some(2), 3.5, Pt2::new(100.0, 200.0));
    let b = FingerObservation::new(FingerId::new(1, 12), Some(2), 4.5, Pt2::new(180.0, 210.0));
    let mut spatial = SpatialFilter::new(12.0);
    let ctx = FrameContext {
        timestamp_ms: 0,
        frame: 1,
        keys: &[],
        bottom_edge_y: None,
    };
    let out = spatial.process(vec![a.clone(), b.clone()], &ctx);
    assert_eq!(out, vec![b.clone()]);

    let mut pipeline = TouchPipeline::new(config(3.0, 2.0, 0)).unwrap();
    let events = pipeline.process(vec![a, b], 0);
    assert_eq!(events.pressed(), vec![2]);
}

#[test]
fn depth_inside_the_band_never_changes_key_state() {
    let mut pipeline = TouchPipeline::new(config(3.0, 2.0, 0)).unwrap();
    let band = [2.0, 2.4, 2.99, 2.5, 2.0, 2.7];

    // Released key stays released.
    for (i, &d) in band.iter().enumerate() {
        let e = pipeline.process(vec![index_finger(1, d)], i as u64 * FRAME_MS);
        assert!(e.is_empty(), "frame {i}");
    }

    // Pressed key stays pressed.
    let t0 = 10 * FRAME_MS;
    assert_eq!(pipeline.process(vec![index_finger(1, 3.2)], t0).pressed(), vec![1]);
    for (i, &d) in band.iter().enumerate() {
        let e = pipeline.process(vec![index_finger(1, d)], t0 + (i as u64 + 1) * FRAME_MS);
        assert!(e.is_empty(), "frame {i}");
    }
    assert!(pipeline.key_state(1).unwrap().pressed);
}

#[test]
fn no_key_changes_twice_within_the_cooldown() {
    let cooldown = 100;
    let mut pipeline = TouchPipeline::new(config(3.0, 2.0, cooldown)).unwrap();
    let mut transitions = Vec::new();
    for i in 0..60u64 {
        // Finger chatters across both thresholds every frame.
        let depth = if i % 2 == 0 { 4.0 } else { 0.5 };
        let t = i * 10;
        let e = pipeline.process(vec![index_finger(3, depth)], t);
        if !e.is_empty() {
            transitions.push(t);
        }
    }
    assert!(transitions.len() > 2);
    for pair in transitions.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown, "{transitions:?}");
    }
}

#[test]
fn repeated_frame_is_idempotent() {
    let mut pipeline = TouchPipeline::new(config(3.0, 2.0, 0)).unwrap();
    let first = pipeline.process(vec![index_finger(4, 5.0)], 1000);
    assert_eq!(first.pressed(), vec![4]);

    let again = pipeline.process(vec![index_finger(4, 5.0)], 1000);
    assert_eq!(again, first);
    // Even different input for the same timestamp does not change state.
    let again = pipeline.process(vec![], 1000);
    assert_eq!(again, first);
    assert!(pipeline.key_state(4).unwrap().pressed);
}

#[test]
fn sliding_off_the_bottom_edge_releases_after_grace() {
    let strip = KeyStrip::new(0.0, 300.0, 640.0, 100.0, 8);
    let mut config = config(3.0, 2.0, 0);
    config.exit_zone.margin_px = 20.0;
    config.exit_zone.grace_ms = 100;
    let mut pipeline = TouchPipeline::new(config).unwrap().with_keyboard(&strip);

    let at = |y: f64| FingerObservation::new(FingerId::new(0, 8), Some(1), 4.0, Pt2::new(100.0, y));
    assert_eq!(pipeline.process(vec![at(370.0)], 0).pressed(), vec![1]);
    assert!(pipeline.process(vec![at(385.0)], 30).is_empty());
    // Finger leaves the keyboard downwards.
    assert!(pipeline.process(vec![], 60).is_empty());
    assert!(pipeline.process(vec![], 120).is_empty());
    assert_eq!(pipeline.process(vec![], 170).released(), vec![1]);
}
