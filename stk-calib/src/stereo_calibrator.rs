//! Relative pose of two intrinsically calibrated cameras.

use image::GrayImage;
use log::{debug, info, warn};
use nalgebra::{DVector, Matrix3, Vector3};
use stk_core::coordinate::{average_rotations, skew};
use stk_core::{
    BoardGeometry, CalibrationError, CalibrationRecord, CameraIntrinsics, CorrespondenceSet,
    PinholeCamera, Pt2, RectificationTransforms, RigidTransform, Side, StereoExtrinsics, StkError,
};
use stk_io::FrameArchive;

use crate::chessboard::{BoardDetection, ChessboardFinder};
use crate::homography::find_homography;
use crate::rectify::stereo_rectify;
use crate::reprojection::{
    POSE_LEN, all_finite, pack_pose, push_residuals, squared_error, unpack_pose,
};
use crate::settings::CalibrationSettings;
use crate::solver::{NllsProblem, SolveOptions, solve};
use crate::zhang::pose_from_homography;

pub type StereoPair = (CorrespondenceSet, CorrespondenceSet);

/// Board pose from undistorted normalized coordinates.
fn initial_pose(camera: &PinholeCamera, set: &CorrespondenceSet) -> Result<RigidTransform, CalibrationError> {
    let mut plane = Vec::with_capacity(set.len());
    let mut normalized = Vec::with_capacity(set.len());
    for (obj, img) in set.object_points().iter().zip(set.image_points()) {
        let (x, y) = camera
            .normalize((img.x, img.y))
            .map_err(|e| CalibrationError::Degenerate(format!("cannot undistort corner: {e}")))?;
        plane.push(Pt2::new(obj.x, obj.y));
        normalized.push(Pt2::new(x, y));
    }
    let h = find_homography(&plane, &normalized)?;
    pose_from_homography(&Matrix3::identity(), &h)
}

struct StereoProblem<'a> {
    pairs: &'a [StereoPair],
    left: &'a PinholeCamera,
    right: &'a PinholeCamera,
}

impl NllsProblem for StereoProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let params = x.as_slice();
        let relative = unpack_pose(&params[..POSE_LEN]);
        let mut r = Vec::with_capacity(self.pairs.iter().map(|(l, rr)| 2 * (l.len() + rr.len())).sum());
        for (k, (left_set, right_set)) in self.pairs.iter().enumerate() {
            let start = POSE_LEN * (k + 1);
            let board_in_left = unpack_pose(&params[start..start + POSE_LEN]);
            push_residuals(&mut r, self.left, &board_in_left, left_set);
            push_residuals(&mut r, self.right, &relative.compose(&board_in_left), right_set);
        }
        DVector::from_vec(r)
    }
}

/// Essential and fundamental matrices for `x_right = R * x_left + T`.
pub fn epipolar_matrices(
    left: &Matrix3<f64>,
    right: &Matrix3<f64>,
    relative: &RigidTransform,
) -> Result<(Matrix3<f64>, Matrix3<f64>), CalibrationError> {
    let essential = skew(&relative.translation) * relative.rotation;
    let (Some(kl_inv), Some(kr_inv)) = (left.try_inverse(), right.try_inverse()) else {
        return Err(CalibrationError::Degenerate("camera matrix is singular".into()));
    };
    let mut fundamental = kr_inv.transpose() * essential * kl_inv;
    let scale = fundamental[(2, 2)];
    if scale.abs() > f64::EPSILON {
        fundamental /= scale;
    }
    Ok((essential, fundamental))
}

/// Solve the relative pose with both cameras' intrinsics held fixed.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all, fields(pairs = pairs.len())))]
pub fn calibrate_pairs(
    pairs: &[StereoPair],
    left: &CameraIntrinsics,
    right: &CameraIntrinsics,
    settings: &CalibrationSettings,
) -> Result<StereoExtrinsics, CalibrationError> {
    if pairs.len() < settings.min_pairs {
        return Err(CalibrationError::InsufficientViews {
            got: pairs.len(),
            required: settings.min_pairs,
        });
    }
    let left_camera = left.camera();
    let right_camera = right.camera();

    let mut board_poses = Vec::with_capacity(pairs.len());
    let mut rotations = Vec::with_capacity(pairs.len());
    let mut translation = Vector3::zeros();
    for (left_set, right_set) in pairs {
        let in_left = initial_pose(&left_camera, left_set)?;
        let in_right = initial_pose(&right_camera, right_set)?;
        let relative = in_right.compose(&in_left.inverse());
        rotations.push(relative.rotation);
        translation += relative.translation;
        board_poses.push(in_left);
    }
    let rotation =
        average_rotations(&rotations).map_err(|e| CalibrationError::Degenerate(e.to_string()))?;
    let initial = RigidTransform::new(rotation, translation / pairs.len() as f64);
    debug!(
        "initial stereo translation {:?}",
        initial.translation.as_slice()
    );

    let mut x0 = Vec::with_capacity(POSE_LEN * (pairs.len() + 1));
    x0.extend_from_slice(&pack_pose(&initial));
    for pose in &board_poses {
        x0.extend_from_slice(&pack_pose(pose));
    }

    let problem = StereoProblem {
        pairs,
        left: &left_camera,
        right: &right_camera,
    };
    let opts = SolveOptions {
        max_iters: settings.max_solver_iterations,
        ..SolveOptions::default()
    };
    let (x, report) = solve(&problem, DVector::from_vec(x0), &opts);
    debug!(
        "stereo solve: {} evaluations, cost {:.6e}, {}",
        report.evaluations, report.final_cost, report.termination
    );
    if !all_finite(&x) {
        return Err(CalibrationError::SolverDivergence(format!(
            "non-finite parameters after {}",
            report.termination
        )));
    }

    let params = x.as_slice();
    let relative = unpack_pose(&params[..POSE_LEN]);
    let (mut sq, mut n) = (0.0, 0usize);
    for (k, (left_set, right_set)) in pairs.iter().enumerate() {
        let start = POSE_LEN * (k + 1);
        let board_in_left = unpack_pose(&params[start..start + POSE_LEN]);
        let (sl, nl) = squared_error(&left_camera, &board_in_left, left_set);
        let (sr, nr) = squared_error(&right_camera, &relative.compose(&board_in_left), right_set);
        sq += sl + sr;
        n += nl + nr;
    }
    let rms = (sq / n.max(1) as f64).sqrt();
    if !rms.is_finite() || (!report.converged && rms > settings.divergence_error) {
        return Err(CalibrationError::SolverDivergence(format!(
            "{} with RMS {rms:.3} px",
            report.termination
        )));
    }

    let (essential, fundamental) =
        epipolar_matrices(&left.camera_matrix, &right.camera_matrix, &relative)?;
    Ok(StereoExtrinsics {
        rotation_matrix: relative.rotation,
        translation_vector: relative.translation,
        essential_matrix: essential,
        fundamental_matrix: fundamental,
        rms_error: rms,
        // Board units are millimetres.
        baseline_cm: relative.translation.norm() / 10.0,
        num_pairs: pairs.len(),
        rectification: None,
    })
}

/// Detection outcome for a simultaneous frame pair.
#[derive(Debug, Clone)]
pub struct PairDetection {
    pub both_found: bool,
    pub left: BoardDetection,
    pub right: BoardDetection,
}

/// Accumulates simultaneous board views and solves the stereo extrinsics.
pub struct StereoCalibrator {
    left: CameraIntrinsics,
    right: CameraIntrinsics,
    settings: CalibrationSettings,
    finder: ChessboardFinder,
    pairs: Vec<StereoPair>,
    archive: Option<FrameArchive>,
    extrinsics: Option<StereoExtrinsics>,
}

impl StereoCalibrator {
    pub fn new(
        board: BoardGeometry,
        left: CameraIntrinsics,
        right: CameraIntrinsics,
        settings: CalibrationSettings,
    ) -> Self {
        Self {
            left,
            right,
            settings,
            finder: ChessboardFinder::new(board),
            pairs: Vec::new(),
            archive: None,
            extrinsics: None,
        }
    }

    /// Start from a phase-1 record; both cameras must be calibrated.
    pub fn from_record(
        record: &CalibrationRecord,
        settings: CalibrationSettings,
    ) -> Result<Self, CalibrationError> {
        let left = record
            .camera(Side::Left)
            .ok_or(CalibrationError::IntrinsicsRequired(Side::Left))?;
        let right = record
            .camera(Side::Right)
            .ok_or(CalibrationError::IntrinsicsRequired(Side::Right))?;
        Ok(Self::new(
            record.board_config,
            left.clone(),
            right.clone(),
            settings,
        ))
    }

    pub fn with_archive(mut self, archive: FrameArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn can_calibrate(&self) -> bool {
        self.pairs.len() >= self.settings.min_pairs
    }

    pub fn extrinsics(&self) -> Option<&StereoExtrinsics> {
        self.extrinsics.as_ref()
    }

    pub fn detect_pair(&self, left: &GrayImage, right: &GrayImage) -> PairDetection {
        let (left, right) = rayon::join(|| self.finder.detect(left), || self.finder.detect(right));
        PairDetection {
            both_found: left.found && right.found,
            left,
            right,
        }
    }

    /// Append the pair from a detection in which both cameras saw the board.
    pub fn capture_pair(
        &mut self,
        left_frame: &GrayImage,
        right_frame: &GrayImage,
        detection: &PairDetection,
    ) -> Result<usize, StkError> {
        if !detection.both_found {
            return Err(StkError::InvalidInput(
                "board must be visible to both cameras in the same frame".into(),
            ));
        }
        let board = self.finder.board();
        let left_set = CorrespondenceSet::for_board(board, detection.left.corners.clone())?;
        let right_set = CorrespondenceSet::for_board(board, detection.right.corners.clone())?;
        self.check_capacity()?;
        if let Some(archive) = &self.archive {
            let index = self.pairs.len();
            archive.store("stereo_left", index, left_frame)?;
            archive.store("stereo_right", index, right_frame)?;
        }
        self.push(left_set, right_set)
    }

    /// Add a pair that did not come from live frames.
    pub fn add_pair(
        &mut self,
        left: CorrespondenceSet,
        right: CorrespondenceSet,
    ) -> Result<usize, StkError> {
        let expected = self.finder.board().corner_count();
        for set in [&left, &right] {
            if set.len() != expected {
                return Err(CalibrationError::CorrespondenceMismatch {
                    expected,
                    got: set.len(),
                }
                .into());
            }
        }
        self.check_capacity()?;
        self.push(left, right)
    }

    fn check_capacity(&self) -> Result<(), StkError> {
        if self.pairs.len() >= self.settings.max_pairs {
            warn!("stereo capture refused: already holding {} pairs", self.pairs.len());
            return Err(StkError::InvalidInput(format!(
                "capture limit of {} pairs reached",
                self.settings.max_pairs
            )));
        }
        Ok(())
    }

    fn push(&mut self, left: CorrespondenceSet, right: CorrespondenceSet) -> Result<usize, StkError> {
        self.pairs.push((left, right));
        debug!("stereo pair {}/{}", self.pairs.len(), self.settings.min_pairs);
        Ok(self.pairs.len())
    }

    pub fn remove_pair(&mut self, index: usize) -> Option<StereoPair> {
        (index < self.pairs.len()).then(|| self.pairs.remove(index))
    }

    pub fn calibrate(&mut self) -> Result<StereoExtrinsics, CalibrationError> {
        let extrinsics = calibrate_pairs(&self.pairs, &self.left, &self.right, &self.settings)?;
        if extrinsics.rms_error > self.settings.max_reprojection_error {
            warn!(
                "stereo RMS {:.3} px exceeds {:.1} px; consider recapturing",
                extrinsics.rms_error, self.settings.max_reprojection_error
            );
        } else {
            info!(
                "stereo calibrated from {} pairs: baseline {:.2} cm, RMS {:.4} px",
                extrinsics.num_pairs, extrinsics.baseline_cm, extrinsics.rms_error
            );
        }
        self.extrinsics = Some(extrinsics.clone());
        Ok(extrinsics)
    }

    /// Derive rectification from the solved extrinsics and attach it to them.
    pub fn compute_rectification(&mut self) -> Result<RectificationTransforms, CalibrationError> {
        let extrinsics = self
            .extrinsics
            .as_mut()
            .ok_or(CalibrationError::ExtrinsicsNotComputed)?;
        let rect = stereo_rectify(&self.left.camera(), &self.right.camera(), &extrinsics.transform())?;
        extrinsics.rectification = Some(rect.clone());
        Ok(rect)
    }
}
