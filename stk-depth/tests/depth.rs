use nalgebra::Vector3;
use stk_calib::ChessboardFinder;
use stk_calib::synthetic::{SyntheticRig, stereo_poses};
use stk_core::{CameraModel, Pt2, Side};
use stk_depth::{DepthEstimator, TriangulationMethod};

fn observe(rig: &SyntheticRig, point_mm: &Vector3<f64>) -> (Pt2, Pt2) {
    let (lu, lv) = rig.left.project(point_mm).unwrap();
    let (ru, rv) = rig.right.project(&rig.stereo.apply(point_mm)).unwrap();
    (Pt2::new(lu, lv), Pt2::new(ru, rv))
}

fn estimator(rig: &SyntheticRig) -> DepthEstimator {
    DepthEstimator::new(&rig.record().unwrap()).unwrap()
}

#[test]
fn scenario_b_point_half_a_metre_ahead() {
    let rig = SyntheticRig::default();
    let record = rig.record().unwrap();
    let baseline = record.stereo.as_ref().unwrap().baseline_cm;
    assert!((baseline - 14.21).abs() < 0.01, "baseline {baseline}");

    let estimator = DepthEstimator::new(&record).unwrap();
    let (left, right) = observe(&rig, &Vector3::new(0.0, 0.0, 500.0));
    let point = estimator.triangulate(&left, &right).unwrap();
    assert!(point.x.abs() < 0.5);
    assert!(point.y.abs() < 0.5);
    assert!((point.z - 50.0).abs() < 0.5, "{point:?}");
}

#[test]
fn dlt_round_trip_is_within_relative_tolerance() {
    let rig = SyntheticRig::default();
    let estimator = estimator(&rig);
    for x in [20.0, 70.0, 120.0] {
        for y in [-60.0, 0.0, 70.0] {
            for z in [350.0, 600.0, 900.0] {
                let truth = Vector3::new(x, y, z);
                let (left, right) = observe(&rig, &truth);
                let cm = estimator
                    .triangulate_with(&left, &right, TriangulationMethod::Dlt)
                    .unwrap();
                let mm = cm.coords * 10.0;
                assert!(
                    (mm - truth).norm() / truth.norm() < 1e-3,
                    "{mm} vs {truth}"
                );
            }
        }
    }
}

#[test]
fn dlt_and_q_matrix_agree() {
    let rig = SyntheticRig::default();
    let estimator = estimator(&rig);
    for truth in [
        Vector3::new(0.0, 0.0, 500.0),
        Vector3::new(40.0, 40.0, 420.0),
        Vector3::new(110.0, -30.0, 780.0),
    ] {
        let (left, right) = observe(&rig, &truth);
        let dlt = estimator
            .triangulate_with(&left, &right, TriangulationMethod::Dlt)
            .unwrap();
        let q = estimator
            .triangulate_with(&left, &right, TriangulationMethod::QMatrix)
            .unwrap();
        assert!((dlt - q).norm() < 1e-3, "{dlt:?} vs {q:?}");
    }
}

#[test]
fn non_positive_disparity_has_no_depth() {
    let rig = SyntheticRig::default();
    let estimator = estimator(&rig);
    let (left, right) = observe(&rig, &Vector3::new(0.0, 0.0, 500.0));
    let disparity = estimator.rectify_point_exact(&left, Side::Left).unwrap().x
        - estimator.rectify_point_exact(&right, Side::Right).unwrap().x;
    assert!(disparity > 100.0);

    // Push the right observation past the left one: negative disparity.
    let crossed = Pt2::new(right.x + disparity + 20.0, right.y);
    for method in [TriangulationMethod::Dlt, TriangulationMethod::QMatrix] {
        assert!(estimator.triangulate_with(&left, &crossed, method).is_none());
        assert!(estimator.triangulate_with(&right, &left, method).is_none());
    }
}

#[test]
fn table_lookup_is_within_a_pixel_of_exact() {
    let rig = SyntheticRig::default();
    let estimator = estimator(&rig);
    for raw in [Pt2::new(12.3, 40.7), Pt2::new(320.5, 240.5), Pt2::new(600.2, 455.9)] {
        for side in Side::BOTH {
            let table = estimator.rectify_point(&raw, side).unwrap();
            let exact = estimator.rectify_point_exact(&raw, side).unwrap();
            assert!((table - exact).norm() < 1.0, "{side}: {table:?} vs {exact:?}");
        }
    }
    assert!(estimator.rectify_point(&Pt2::new(-3.0, 10.0), Side::Left).is_none());
}

#[test]
fn rectified_frames_have_aligned_corner_rows() {
    let rig = SyntheticRig::default();
    let pose = stereo_poses(&rig.board, 1, 650.0, 142.1)[0];
    let estimator = estimator(&rig);

    let left = estimator.rectify_image(&rig.render(Side::Left, &pose), Side::Left);
    let right = estimator.rectify_image(&rig.render(Side::Right, &pose), Side::Right);
    assert_eq!(left.dimensions(), (640, 480));

    let finder = ChessboardFinder::new(rig.board);
    let left_corners = finder.find(&left).unwrap();
    let right_corners = finder.find(&right).unwrap();
    for (l, r) in left_corners.iter().zip(&right_corners) {
        assert!((l.y - r.y).abs() < 1.0, "{l:?} vs {r:?}");
        assert!(l.x > r.x);
    }
}
