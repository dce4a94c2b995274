//! Per-camera intrinsic calibration from accumulated board views.

use image::GrayImage;
use log::{debug, info, warn};
use nalgebra::{DVector, Matrix3};
use stk_core::{
    BoardGeometry, CalibrationError, CameraIntrinsics, CorrespondenceSet, PinholeCamera, Pt2,
    Resolution, RigidTransform, Side, StkError,
};
use stk_io::FrameArchive;

use crate::chessboard::{BoardDetection, ChessboardFinder};
use crate::homography::find_homography;
use crate::reprojection::{
    INTRINSIC_LEN, POSE_LEN, all_finite, pack_camera, pack_pose, push_residuals, unpack_camera,
    unpack_pose, view_error,
};
use crate::settings::CalibrationSettings;
use crate::solver::{NllsProblem, SolveOptions, solve};
use crate::zhang::{intrinsics_from_homographies, pose_from_homography};

/// Solved camera plus the board pose of every view.
#[derive(Debug, Clone)]
pub struct IntrinsicSolution {
    pub camera: PinholeCamera,
    pub poses: Vec<RigidTransform>,
    pub view_errors: Vec<f64>,
    /// Mean of `view_errors`.
    pub mean_error: f64,
}

struct IntrinsicProblem<'a> {
    views: &'a [CorrespondenceSet],
    width: usize,
    height: usize,
}

impl NllsProblem for IntrinsicProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = unpack_camera(&x.as_slice()[..INTRINSIC_LEN], self.width, self.height);
        let mut r = Vec::with_capacity(self.views.iter().map(|v| 2 * v.len()).sum());
        for (k, view) in self.views.iter().enumerate() {
            let start = INTRINSIC_LEN + k * POSE_LEN;
            let pose = unpack_pose(&x.as_slice()[start..start + POSE_LEN]);
            push_residuals(&mut r, &camera, &pose, view);
        }
        DVector::from_vec(r)
    }
}

fn plausible(k: &Matrix3<f64>, width: f64, height: f64) -> bool {
    let (fx, fy, cx, cy) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
    [fx, fy, cx, cy].iter().all(|v| v.is_finite())
        && fx > 0.0
        && fy > 0.0
        && (0.0..=width).contains(&cx)
        && (0.0..=height).contains(&cy)
}

/// Solve intrinsics, distortion and per-view poses jointly.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all, fields(views = views.len())))]
pub fn calibrate_views(
    views: &[CorrespondenceSet],
    resolution: Resolution,
    settings: &CalibrationSettings,
) -> Result<IntrinsicSolution, CalibrationError> {
    if views.len() < settings.min_images {
        return Err(CalibrationError::InsufficientViews {
            got: views.len(),
            required: settings.min_images,
        });
    }
    let (w, h) = (resolution.width as usize, resolution.height as usize);

    let mut homographies = Vec::with_capacity(views.len());
    for view in views {
        let plane: Vec<Pt2> = view
            .object_points()
            .iter()
            .map(|p| Pt2::new(p.x, p.y))
            .collect();
        homographies.push(find_homography(&plane, view.image_points())?);
    }

    let k0 = match intrinsics_from_homographies(&homographies) {
        Ok(k) if plausible(&k, w as f64, h as f64) => k,
        other => {
            let f = w.max(h) as f64;
            warn!(
                "closed-form intrinsics unusable ({}), starting from f = {f}",
                other.map_or_else(|e| e.to_string(), |_| "implausible".to_string())
            );
            Matrix3::new(f, 0.0, w as f64 / 2.0, 0.0, f, h as f64 / 2.0, 0.0, 0.0, 1.0)
        }
    };
    debug!(
        "initial fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        k0[(0, 0)],
        k0[(1, 1)],
        k0[(0, 2)],
        k0[(1, 2)]
    );

    let initial_camera = PinholeCamera::from_matrix(w, h, &k0, &[0.0; 5]);
    let mut x0 = Vec::with_capacity(INTRINSIC_LEN + POSE_LEN * views.len());
    x0.extend_from_slice(&pack_camera(&initial_camera));
    for hmat in &homographies {
        x0.extend_from_slice(&pack_pose(&pose_from_homography(&k0, hmat)?));
    }

    let problem = IntrinsicProblem {
        views,
        width: w,
        height: h,
    };
    let opts = SolveOptions {
        max_iters: settings.max_solver_iterations,
        ..SolveOptions::default()
    };
    let (x, report) = solve(&problem, DVector::from_vec(x0), &opts);
    debug!(
        "intrinsic solve: {} evaluations, cost {:.6e}, {}",
        report.evaluations, report.final_cost, report.termination
    );

    if !all_finite(&x) || x[0] <= 0.0 || x[1] <= 0.0 {
        return Err(CalibrationError::SolverDivergence(format!(
            "non-physical parameters after {}",
            report.termination
        )));
    }

    let camera = unpack_camera(&x.as_slice()[..INTRINSIC_LEN], w, h);
    let poses: Vec<RigidTransform> = (0..views.len())
        .map(|k| {
            let start = INTRINSIC_LEN + k * POSE_LEN;
            unpack_pose(&x.as_slice()[start..start + POSE_LEN])
        })
        .collect();
    let view_errors: Vec<f64> = views
        .iter()
        .zip(&poses)
        .map(|(view, pose)| view_error(&camera, pose, view))
        .collect();
    let mean_error = view_errors.iter().sum::<f64>() / view_errors.len() as f64;

    if !mean_error.is_finite() || (!report.converged && mean_error > settings.divergence_error) {
        return Err(CalibrationError::SolverDivergence(format!(
            "{} with mean error {mean_error:.3} px",
            report.termination
        )));
    }

    Ok(IntrinsicSolution {
        camera,
        poses,
        view_errors,
        mean_error,
    })
}

/// Accumulates board views for one camera and solves its intrinsics.
pub struct CameraCalibrator {
    side: Side,
    resolution: Resolution,
    settings: CalibrationSettings,
    finder: ChessboardFinder,
    captures: Vec<CorrespondenceSet>,
    archive: Option<FrameArchive>,
    view_errors: Vec<f64>,
}

impl CameraCalibrator {
    pub fn new(
        side: Side,
        board: BoardGeometry,
        resolution: Resolution,
        settings: CalibrationSettings,
    ) -> Self {
        Self {
            side,
            resolution,
            settings,
            finder: ChessboardFinder::new(board),
            captures: Vec::new(),
            archive: None,
            view_errors: Vec::new(),
        }
    }

    /// Keep every accepted frame in `archive` for later audit.
    pub fn with_archive(mut self, archive: FrameArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn board(&self) -> &BoardGeometry {
        self.finder.board()
    }

    pub fn detect(&self, frame: &GrayImage) -> BoardDetection {
        self.finder.detect(frame)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    pub fn captures(&self) -> &[CorrespondenceSet] {
        &self.captures
    }

    pub fn can_calibrate(&self) -> bool {
        self.captures.len() >= self.settings.min_images
    }

    /// Record the corners found in `frame`. Returns the new capture count.
    pub fn capture(&mut self, frame: &GrayImage, corners: Vec<Pt2>) -> Result<usize, StkError> {
        let (w, h) = frame.dimensions();
        if (w, h) != (self.resolution.width, self.resolution.height) {
            return Err(StkError::InvalidInput(format!(
                "{} frame is {w}x{h}, calibrating at {}x{}",
                self.side, self.resolution.width, self.resolution.height
            )));
        }
        let set = CorrespondenceSet::for_board(self.finder.board(), corners)?;
        self.check_capacity()?;
        if let Some(archive) = &self.archive {
            archive.store(&self.side.to_string(), self.captures.len(), frame)?;
        }
        self.push(set)
    }

    /// Add a correspondence set that did not come from a live frame.
    pub fn add_correspondences(&mut self, set: CorrespondenceSet) -> Result<usize, StkError> {
        let expected = self.finder.board().corner_count();
        if set.len() != expected {
            return Err(CalibrationError::CorrespondenceMismatch {
                expected,
                got: set.len(),
            }
            .into());
        }
        self.check_capacity()?;
        self.push(set)
    }

    fn check_capacity(&self) -> Result<(), StkError> {
        if self.captures.len() >= self.settings.max_images {
            warn!(
                "{} capture refused: already holding {} views",
                self.side,
                self.captures.len()
            );
            return Err(StkError::InvalidInput(format!(
                "capture limit of {} views reached",
                self.settings.max_images
            )));
        }
        Ok(())
    }

    fn push(&mut self, set: CorrespondenceSet) -> Result<usize, StkError> {
        self.captures.push(set);
        debug!(
            "{} capture {}/{}",
            self.side,
            self.captures.len(),
            self.settings.min_images
        );
        Ok(self.captures.len())
    }

    /// Drop a view, typically one with a high error in [`view_errors`](Self::view_errors).
    pub fn remove_capture(&mut self, index: usize) -> Option<CorrespondenceSet> {
        (index < self.captures.len()).then(|| {
            self.view_errors.clear();
            self.captures.remove(index)
        })
    }

    /// Per-view errors of the last successful [`calibrate`](Self::calibrate).
    pub fn view_errors(&self) -> &[f64] {
        &self.view_errors
    }

    pub fn calibrate(&mut self) -> Result<CameraIntrinsics, CalibrationError> {
        let solution = calibrate_views(&self.captures, self.resolution, &self.settings)?;
        let error = solution.mean_error;
        if error > self.settings.max_reprojection_error {
            warn!(
                "{} reprojection error {error:.3} px exceeds {:.1} px; consider recapturing",
                self.side, self.settings.max_reprojection_error
            );
        } else {
            info!(
                "{} calibrated from {} views, reprojection error {error:.4} px",
                self.side,
                self.captures.len()
            );
        }
        self.view_errors = solution.view_errors;

        Ok(CameraIntrinsics {
            camera_matrix: solution.camera.camera_matrix(),
            distortion_coeffs: solution.camera.distortion().coeffs(),
            reprojection_error: error,
            num_images: self.captures.len(),
            image_width: self.resolution.width,
            image_height: self.resolution.height,
            world_rotation: None,
            world_translation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticRig, calibration_poses};
    use image::Luma;

    fn rig() -> SyntheticRig {
        SyntheticRig::default()
    }

    #[test]
    fn too_few_views_is_insufficient() {
        let rig = rig();
        let mut calib = CameraCalibrator::new(
            Side::Left,
            rig.board,
            rig.resolution,
            CalibrationSettings::default(),
        );
        for pose in calibration_poses(&rig.board, 5, 600.0) {
            let set = rig.correspondences(&rig.left, &pose).unwrap();
            calib.add_correspondences(set).unwrap();
        }
        let err = calib.calibrate().unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientViews {
                got: 5,
                required: 15
            }
        );
        assert!(err.to_string().starts_with("insufficient views"));
    }

    #[test]
    fn capture_checks_resolution_and_corner_count() {
        let rig = rig();
        let mut calib = CameraCalibrator::new(
            Side::Right,
            rig.board,
            rig.resolution,
            CalibrationSettings::default(),
        );
        let small = GrayImage::from_pixel(32, 32, Luma([0]));
        assert!(matches!(
            calib.capture(&small, vec![]),
            Err(StkError::InvalidInput(_))
        ));

        let frame = GrayImage::from_pixel(rig.resolution.width, rig.resolution.height, Luma([0]));
        assert!(matches!(
            calib.capture(&frame, vec![Pt2::new(1.0, 1.0)]),
            Err(StkError::Calibration(
                CalibrationError::CorrespondenceMismatch { .. }
            ))
        ));
        assert_eq!(calib.capture_count(), 0);
    }

    #[test]
    fn capture_cap_is_enforced() {
        let rig = rig();
        let settings = CalibrationSettings {
            max_images: 3,
            ..CalibrationSettings::default()
        };
        let mut calib = CameraCalibrator::new(Side::Left, rig.board, rig.resolution, settings);
        let poses = calibration_poses(&rig.board, 4, 600.0);
        for pose in &poses[..3] {
            calib
                .add_correspondences(rig.correspondences(&rig.left, pose).unwrap())
                .unwrap();
        }
        let extra = rig.correspondences(&rig.left, &poses[3]).unwrap();
        assert!(calib.add_correspondences(extra).is_err());
        assert_eq!(calib.capture_count(), 3);

        assert!(calib.remove_capture(1).is_some());
        assert!(calib.remove_capture(7).is_none());
        assert_eq!(calib.capture_count(), 2);
    }

    #[test]
    fn accepted_frames_are_archived() {
        let rig = rig();
        let dir = tempfile::tempdir().unwrap();
        let mut calib = CameraCalibrator::new(
            Side::Left,
            rig.board,
            rig.resolution,
            CalibrationSettings::default(),
        )
        .with_archive(FrameArchive::new(dir.path()));

        let pose = calibration_poses(&rig.board, 1, 600.0)[0];
        let set = rig.correspondences(&rig.left, &pose).unwrap();
        let frame = GrayImage::from_pixel(rig.resolution.width, rig.resolution.height, Luma([90]));
        calib.capture(&frame, set.image_points().to_vec()).unwrap();

        assert!(dir.path().join("left_000.png").exists());
    }
}
