//! Synthetic stereo rigs and board renderings with known ground truth.
//!
//! Used by tests and by the CLI's self-check to exercise the calibration and
//! depth paths without hardware.

use image::GrayImage;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use stk_core::coordinate::rodrigues_to_matrix;
use stk_core::{
    BoardGeometry, CalibrationError, CalibrationRecord, CameraIds, CameraIntrinsics, CameraModel,
    CorrespondenceSet, PinholeCamera, Pt2, Resolution, RigidTransform, Side, StereoExtrinsics,
};

use crate::rectify::stereo_rectify;
use crate::stereo_calibrator::epipolar_matrices;

const DARK: f64 = 35.0;
const LIGHT: f64 = 215.0;
const BACKGROUND: f64 = 120.0;
const SUPERSAMPLE: usize = 3;

/// Two cameras with a known relative pose looking at a known board.
#[derive(Debug, Clone)]
pub struct SyntheticRig {
    pub board: BoardGeometry,
    pub resolution: Resolution,
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    /// `x_right = R * x_left + T`, millimetres.
    pub stereo: RigidTransform,
}

impl Default for SyntheticRig {
    fn default() -> Self {
        let board = BoardGeometry {
            cols: 7,
            rows: 7,
            square_size_mm: 30.0,
        };
        let left = PinholeCamera::from_matrix(
            640,
            480,
            &Matrix3::new(800.0, 0.0, 320.0, 0.0, 805.0, 240.0, 0.0, 0.0, 1.0),
            &[-0.08, 0.02, 0.0, 0.0, 0.0],
        );
        let right = PinholeCamera::from_matrix(
            640,
            480,
            &Matrix3::new(790.0, 0.0, 316.0, 0.0, 795.0, 244.0, 0.0, 0.0, 1.0),
            &[-0.05, 0.01, 0.0, 0.0, 0.0],
        );
        let stereo = RigidTransform::from_rodrigues(
            &Vector3::new(0.004, -0.02, 0.003),
            Vector3::new(-142.1, 0.8, 1.5),
        );
        Self {
            board,
            resolution: Resolution::new(640, 480),
            left,
            right,
            stereo,
        }
    }
}

impl SyntheticRig {
    pub fn camera(&self, side: Side) -> &PinholeCamera {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Ground-truth intrinsics in record form.
    pub fn intrinsics(&self, side: Side) -> CameraIntrinsics {
        let camera = self.camera(side);
        CameraIntrinsics {
            camera_matrix: camera.camera_matrix(),
            distortion_coeffs: camera.distortion().coeffs(),
            reprojection_error: 0.0,
            num_images: 0,
            image_width: self.resolution.width,
            image_height: self.resolution.height,
            world_rotation: None,
            world_translation: None,
        }
    }

    /// Board corners as seen by `camera` at board pose `pose`, or `None` if
    /// any corner is behind the camera or off the image.
    pub fn correspondences(
        &self,
        camera: &PinholeCamera,
        pose: &RigidTransform,
    ) -> Option<CorrespondenceSet> {
        let (w, h) = camera.image_size();
        let image: Option<Vec<Pt2>> = self
            .board
            .object_points()
            .iter()
            .map(|p| {
                let (u, v) = camera.project(&pose.apply(&p.coords))?;
                let inside = u >= 0.0 && v >= 0.0 && u < w as f64 && v < h as f64;
                inside.then(|| Pt2::new(u, v))
            })
            .collect();
        CorrespondenceSet::for_board(&self.board, image?).ok()
    }

    /// Simultaneous views for a board pose given in the left camera frame.
    pub fn stereo_correspondences(
        &self,
        left_pose: &RigidTransform,
    ) -> Option<(CorrespondenceSet, CorrespondenceSet)> {
        let right_pose = self.stereo.compose(left_pose);
        Some((
            self.correspondences(&self.left, left_pose)?,
            self.correspondences(&self.right, &right_pose)?,
        ))
    }

    /// Image of the board seen by `side`, for a board pose given in the left
    /// camera frame.
    pub fn render(&self, side: Side, left_pose: &RigidTransform) -> GrayImage {
        match side {
            Side::Left => render_board(&self.left, &self.board, left_pose),
            Side::Right => render_board(&self.right, &self.board, &self.stereo.compose(left_pose)),
        }
    }

    /// Ground-truth record with both phases and rectification filled in.
    pub fn record(&self) -> Result<CalibrationRecord, CalibrationError> {
        let left = self.intrinsics(Side::Left);
        let right = self.intrinsics(Side::Right);
        let (essential, fundamental) =
            epipolar_matrices(&left.camera_matrix, &right.camera_matrix, &self.stereo)?;
        let rectification = stereo_rectify(&self.left, &self.right, &self.stereo)?;

        let mut record = CalibrationRecord::new(
            self.board,
            CameraIds {
                left: "synthetic-left".into(),
                right: "synthetic-right".into(),
            },
            self.resolution,
        );
        record.set_camera(Side::Left, left);
        record.set_camera(Side::Right, right);
        record.stereo = Some(StereoExtrinsics {
            rotation_matrix: self.stereo.rotation,
            translation_vector: self.stereo.translation,
            essential_matrix: essential,
            fundamental_matrix: fundamental,
            rms_error: 0.0,
            baseline_cm: self.stereo.translation.norm() / 10.0,
            num_pairs: 0,
            rectification: Some(rectification),
        });
        Ok(record)
    }
}

fn pose_facing_camera(
    board: &BoardGeometry,
    rvec: Vector3<f64>,
    target: Vector3<f64>,
) -> RigidTransform {
    let rotation = rodrigues_to_matrix(&rvec);
    let center = Vector3::new(
        (board.cols - 1) as f64 * board.square_size_mm / 2.0,
        (board.rows - 1) as f64 * board.square_size_mm / 2.0,
        0.0,
    );
    RigidTransform::new(rotation, target - rotation * center)
}

/// `count` varied board poses centred in front of a camera at `distance` mm.
pub fn calibration_poses(board: &BoardGeometry, count: usize, distance: f64) -> Vec<RigidTransform> {
    (0..count)
        .map(|k| {
            let k = k as f64;
            let rvec = Vector3::new(
                0.3 * (1.3 * k + 0.4).sin(),
                0.3 * (0.9 * k + 0.2).cos(),
                0.1 * (0.7 * k).sin(),
            );
            let target = Vector3::new(
                35.0 * (2.1 * k).sin(),
                25.0 * (1.7 * k).cos(),
                distance + 60.0 * (0.5 * k).sin(),
            );
            pose_facing_camera(board, rvec, target)
        })
        .collect()
}

/// Board poses in the left camera frame that stay visible to both cameras of
/// a rig with the given baseline.
pub fn stereo_poses(
    board: &BoardGeometry,
    count: usize,
    distance: f64,
    baseline_mm: f64,
) -> Vec<RigidTransform> {
    (0..count)
        .map(|k| {
            let k = k as f64;
            let rvec = Vector3::new(
                0.2 * (1.1 * k + 0.3).sin(),
                0.2 * (0.8 * k + 0.5).cos(),
                0.08 * (0.6 * k).sin(),
            );
            let target = Vector3::new(
                baseline_mm / 2.0 + 15.0 * (1.9 * k).sin(),
                20.0 * (1.3 * k).cos(),
                distance + 50.0 * (0.7 * k).sin(),
            );
            pose_facing_camera(board, rvec, target)
        })
        .collect()
}

fn board_intensity(board: &BoardGeometry, x: f64, y: f64) -> f64 {
    let s = board.square_size_mm;
    let ix = (x / s).floor() as i64;
    let iy = (y / s).floor() as i64;
    let (cols, rows) = (board.cols as i64, board.rows as i64);
    let in_checker = (-1..cols).contains(&ix) && (-1..rows).contains(&iy);
    if in_checker {
        if (ix + iy).rem_euclid(2) == 0 { DARK } else { LIGHT }
    } else if (-2..=cols).contains(&ix) && (-2..=rows).contains(&iy) {
        LIGHT
    } else {
        BACKGROUND
    }
}

/// Ray-trace the board with a one-square white margin, supersampled.
pub fn render_board(
    camera: &PinholeCamera,
    board: &BoardGeometry,
    pose: &RigidTransform,
) -> GrayImage {
    let (w, h) = camera.image_size();
    let inverse = pose.inverse();
    let normal = pose.rotation.column(2).into_owned();
    let plane_offset = normal.dot(&pose.translation);

    let shade = |u: f64, v: f64| -> f64 {
        let Ok(ray) = camera.unproject((u, v)) else {
            return BACKGROUND;
        };
        let denom = normal.dot(&ray);
        if denom.abs() < 1e-12 {
            return BACKGROUND;
        }
        let s = plane_offset / denom;
        if s <= 0.0 {
            return BACKGROUND;
        }
        let local = inverse.apply(&(ray * s));
        board_intensity(board, local.x, local.y)
    };

    let mut data = vec![0u8; w * h];
    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let u = x as f64 + (sx as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5;
                    let v = y as f64 + (sy as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5;
                    acc += shade(u, v);
                }
            }
            *out = (acc / (SUPERSAMPLE * SUPERSAMPLE) as f64).round() as u8;
        }
    });
    GrayImage::from_raw(w as u32, h as u32, data)
        .unwrap_or_else(|| GrayImage::new(w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rig_sees_all_calibration_poses() {
        let rig = SyntheticRig::default();
        for pose in calibration_poses(&rig.board, 20, 600.0) {
            assert!(rig.correspondences(&rig.left, &pose).is_some());
            assert!(rig.correspondences(&rig.right, &pose).is_some());
        }
    }

    #[test]
    fn stereo_poses_are_visible_to_both_cameras() {
        let rig = SyntheticRig::default();
        for pose in stereo_poses(&rig.board, 12, 650.0, 142.1) {
            assert!(rig.stereo_correspondences(&pose).is_some());
        }
    }

    #[test]
    fn ground_truth_record_is_complete() {
        let record = SyntheticRig::default().record().unwrap();
        assert!(record.is_phase1_complete());
        assert!(record.is_phase2_complete());
        assert!(record.require_complete().is_ok());
        assert!((record.summary().baseline_cm.unwrap() - 14.21).abs() < 0.01);
    }

    #[test]
    fn corner_squares_alternate() {
        let board = BoardGeometry::new(4, 3, 10.0).unwrap();
        assert_eq!(board_intensity(&board, -5.0, -5.0), DARK);
        assert_eq!(board_intensity(&board, 5.0, -5.0), LIGHT);
        assert_eq!(board_intensity(&board, 5.0, 5.0), DARK);
        assert_eq!(board_intensity(&board, -15.0, 5.0), LIGHT);
        assert_eq!(board_intensity(&board, -50.0, 5.0), BACKGROUND);
    }
}
