//! The persisted calibration record.
//!
//! Field names follow the on-disk schema (`boardConfig`, `leftCamera`, ...).
//! Matrices are stored as nested row arrays; a `null` `stereo` section marks a
//! record that only finished the per-camera phase.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::board::BoardGeometry;
use crate::camera::PinholeCamera;
use crate::coordinate::RigidTransform;
use crate::error::CalibrationError;
use crate::types::{Pt2, Resolution, Side};

/// Intrinsic calibration of one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraIntrinsics {
    #[serde(with = "rows")]
    pub camera_matrix: Matrix3<f64>,
    /// `[k1, k2, p1, p2, k3]`
    pub distortion_coeffs: [f64; 5],
    /// Mean per-view reprojection error in pixels.
    pub reprojection_error: f64,
    pub num_images: usize,
    pub image_width: u32,
    pub image_height: u32,
    /// Optional world-to-camera rotation (`x_cam = R * x_world + t`).
    /// Absent means identity.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_rows")]
    pub world_rotation: Option<Matrix3<f64>>,
    /// Optional world-to-camera translation, paired with `world_rotation`.
    /// Absent means zero.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_rows")]
    pub world_translation: Option<Vector3<f64>>,
}

impl CameraIntrinsics {
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::from_matrix(
            self.image_width as usize,
            self.image_height as usize,
            &self.camera_matrix,
            &self.distortion_coeffs,
        )
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image_width, self.image_height)
    }

    /// World pose of this camera (`x_cam = R * x_world + t`).
    ///
    /// Defaults to identity rotation and zero translation when the record
    /// does not carry an explicit world transform.
    pub fn world_transform(&self) -> RigidTransform {
        RigidTransform::new(
            self.world_rotation.unwrap_or_else(Matrix3::identity),
            self.world_translation.unwrap_or_else(Vector3::zeros),
        )
    }

    pub fn has_world_transform(&self) -> bool {
        self.world_rotation.is_some() || self.world_translation.is_some()
    }
}

/// Row-aligning rectification of the stereo pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectificationTransforms {
    #[serde(rename = "R1", with = "rows")]
    pub r1: Matrix3<f64>,
    #[serde(rename = "R2", with = "rows")]
    pub r2: Matrix3<f64>,
    #[serde(rename = "P1", with = "rows")]
    pub p1: Matrix3x4<f64>,
    #[serde(rename = "P2", with = "rows")]
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth reprojection matrix.
    #[serde(rename = "Q", with = "rows")]
    pub q: Matrix4<f64>,
}

impl RectificationTransforms {
    pub fn rotation(&self, side: Side) -> &Matrix3<f64> {
        match side {
            Side::Left => &self.r1,
            Side::Right => &self.r2,
        }
    }

    pub fn projection(&self, side: Side) -> &Matrix3x4<f64> {
        match side {
            Side::Left => &self.p1,
            Side::Right => &self.p2,
        }
    }

    /// Rectified pixel for a raw (distorted) pixel of `side`, or `None` if it
    /// cannot be undistorted or rotates behind the rectified camera.
    pub fn rectify_pixel(&self, side: Side, camera: &PinholeCamera, pixel: &Pt2) -> Option<Pt2> {
        let (x, y) = camera.normalize((pixel.x, pixel.y)).ok()?;
        let ray = self.rotation(side) * Vector3::new(x, y, 1.0);
        if ray.z <= f64::EPSILON {
            return None;
        }
        let p = self.projection(side);
        Some(Pt2::new(
            p[(0, 0)] * ray.x / ray.z + p[(0, 2)],
            p[(1, 1)] * ray.y / ray.z + p[(1, 2)],
        ))
    }

    /// Index of the image axis the baseline lies on after rectification
    /// (0 for side-by-side, 1 for stacked cameras).
    pub fn baseline_axis(&self) -> usize {
        if self.p2[(0, 3)].abs() >= self.p2[(1, 3)].abs() { 0 } else { 1 }
    }
}

/// Relative pose of the right camera with respect to the left camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StereoExtrinsics {
    /// `x_right = R * x_left + T`
    #[serde(with = "rows")]
    pub rotation_matrix: Matrix3<f64>,
    /// Millimetres, in the board's unit.
    #[serde(with = "rows")]
    pub translation_vector: Vector3<f64>,
    #[serde(with = "rows")]
    pub essential_matrix: Matrix3<f64>,
    #[serde(with = "rows")]
    pub fundamental_matrix: Matrix3<f64>,
    pub rms_error: f64,
    pub baseline_cm: f64,
    pub num_pairs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rectification: Option<RectificationTransforms>,
}

impl StereoExtrinsics {
    pub fn transform(&self) -> RigidTransform {
        RigidTransform::new(self.rotation_matrix, self.translation_vector)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraIds {
    pub left: String,
    pub right: String,
}

/// Everything both calibration phases produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    pub board_config: BoardGeometry,
    #[serde(default)]
    pub left_camera: Option<CameraIntrinsics>,
    #[serde(default)]
    pub right_camera: Option<CameraIntrinsics>,
    #[serde(default)]
    pub stereo: Option<StereoExtrinsics>,
    #[serde(default)]
    pub camera_ids: CameraIds,
    #[serde(default)]
    pub resolution: Resolution,
}

impl CalibrationRecord {
    pub fn new(board_config: BoardGeometry, camera_ids: CameraIds, resolution: Resolution) -> Self {
        Self {
            board_config,
            left_camera: None,
            right_camera: None,
            stereo: None,
            camera_ids,
            resolution,
        }
    }

    pub fn camera(&self, side: Side) -> Option<&CameraIntrinsics> {
        match side {
            Side::Left => self.left_camera.as_ref(),
            Side::Right => self.right_camera.as_ref(),
        }
    }

    pub fn set_camera(&mut self, side: Side, intrinsics: CameraIntrinsics) {
        match side {
            Side::Left => self.left_camera = Some(intrinsics),
            Side::Right => self.right_camera = Some(intrinsics),
        }
    }

    pub fn rectification(&self) -> Option<&RectificationTransforms> {
        self.stereo.as_ref().and_then(|s| s.rectification.as_ref())
    }

    /// Both cameras carry a camera matrix.
    pub fn is_phase1_complete(&self) -> bool {
        self.left_camera.is_some() && self.right_camera.is_some()
    }

    /// The stereo section is present.
    pub fn is_phase2_complete(&self) -> bool {
        self.stereo.is_some()
    }

    /// Fails with the first missing section a depth estimator needs.
    pub fn require_complete(
        &self,
    ) -> Result<
        (
            &CameraIntrinsics,
            &CameraIntrinsics,
            &StereoExtrinsics,
            &RectificationTransforms,
        ),
        CalibrationError,
    > {
        let left = self
            .left_camera
            .as_ref()
            .ok_or(CalibrationError::IntrinsicsRequired(Side::Left))?;
        let right = self
            .right_camera
            .as_ref()
            .ok_or(CalibrationError::IntrinsicsRequired(Side::Right))?;
        let stereo = self
            .stereo
            .as_ref()
            .ok_or(CalibrationError::MissingSection("stereo"))?;
        let rect = stereo
            .rectification
            .as_ref()
            .ok_or(CalibrationError::MissingSection("rectification"))?;
        Ok((left, right, stereo, rect))
    }

    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary {
            left_error: self.left_camera.as_ref().map(|c| c.reprojection_error),
            right_error: self.right_camera.as_ref().map(|c| c.reprojection_error),
            left_images: self.left_camera.as_ref().map_or(0, |c| c.num_images),
            right_images: self.right_camera.as_ref().map_or(0, |c| c.num_images),
            stereo_rms: self.stereo.as_ref().map(|s| s.rms_error),
            baseline_cm: self.stereo.as_ref().map(|s| s.baseline_cm),
            stereo_pairs: self.stereo.as_ref().map_or(0, |s| s.num_pairs),
            phase1_complete: self.is_phase1_complete(),
            phase2_complete: self.is_phase2_complete(),
        }
    }
}

/// Display-oriented digest of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub left_error: Option<f64>,
    pub right_error: Option<f64>,
    pub left_images: usize,
    pub right_images: usize,
    pub stereo_rms: Option<f64>,
    pub baseline_cm: Option<f64>,
    pub stereo_pairs: usize,
    pub phase1_complete: bool,
    pub phase2_complete: bool,
}

/// Fixed-size matrices as nested row arrays. Flat row-major arrays are
/// accepted when reading.
mod rows {
    use nalgebra::SMatrix;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Nested(Vec<Vec<f64>>),
        Flat(Vec<f64>),
    }

    pub fn serialize<S, const R: usize, const C: usize>(
        m: &SMatrix<f64, R, C>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rows: Vec<Vec<f64>> = (0..R)
            .map(|r| (0..C).map(|c| m[(r, c)]).collect())
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D, const R: usize, const C: usize>(
        deserializer: D,
    ) -> Result<SMatrix<f64, R, C>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flat: Vec<f64> = match Shape::deserialize(deserializer)? {
            Shape::Nested(rows) => rows.into_iter().flatten().collect(),
            Shape::Flat(values) => values,
        };
        if flat.len() != R * C {
            return Err(D::Error::custom(format!(
                "expected {}x{} matrix ({} values), got {} values",
                R,
                C,
                R * C,
                flat.len()
            )));
        }
        Ok(SMatrix::<f64, R, C>::from_row_slice(&flat))
    }
}

mod opt_rows {
    use nalgebra::SMatrix;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const R: usize, const C: usize>(
        m: &Option<SMatrix<f64, R, C>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match m {
            Some(m) => super::rows::serialize(m, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, const R: usize, const C: usize>(
        deserializer: D,
    ) -> Result<Option<SMatrix<f64, R, C>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapped<const R: usize, const C: usize>(
            #[serde(with = "super::rows")] SMatrix<f64, R, C>,
        );

        let wrapped: Option<Wrapped<R, C>> = Option::deserialize(deserializer)?;
        Ok(wrapped.map(|Wrapped(m)| m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            camera_matrix: Matrix3::new(800.0, 0.0, 320.0, 0.0, 805.0, 240.0, 0.0, 0.0, 1.0),
            distortion_coeffs: [-0.1, 0.02, 0.001, -0.002, 0.0],
            reprojection_error: 0.21,
            num_images: 20,
            image_width: 640,
            image_height: 480,
            world_rotation: None,
            world_translation: None,
        }
    }

    fn phase1_record() -> CalibrationRecord {
        let mut record = CalibrationRecord::new(
            BoardGeometry::new(7, 7, 30.0).unwrap(),
            CameraIds {
                left: "0".into(),
                right: "1".into(),
            },
            Resolution::new(640, 480),
        );
        record.set_camera(Side::Left, intrinsics());
        record.set_camera(Side::Right, intrinsics());
        record
    }

    #[test]
    fn phase1_record_serializes_null_stereo() {
        let record = phase1_record();
        let json = serde_json::to_value(&record).unwrap();

        assert!(json["stereo"].is_null());
        assert_eq!(json["boardConfig"]["squareSizeMm"], 30.0);
        assert_eq!(json["leftCamera"]["cameraMatrix"][0][2], 320.0);
        assert_eq!(json["leftCamera"]["cameraMatrix"][1][1], 805.0);
        assert_eq!(json["rightCamera"]["distortionCoeffs"][0], -0.1);
        assert!(json["leftCamera"].get("worldRotation").is_none());
        assert!(record.is_phase1_complete());
        assert!(!record.is_phase2_complete());
    }

    #[test]
    fn record_roundtrips_through_json() {
        let mut record = phase1_record();
        record.stereo = Some(StereoExtrinsics {
            rotation_matrix: Matrix3::identity(),
            translation_vector: Vector3::new(-142.1, 0.0, 0.0),
            essential_matrix: Matrix3::zeros(),
            fundamental_matrix: Matrix3::zeros(),
            rms_error: 0.3,
            baseline_cm: 14.21,
            num_pairs: 12,
            rectification: Some(RectificationTransforms {
                r1: Matrix3::identity(),
                r2: Matrix3::identity(),
                p1: Matrix3x4::identity(),
                p2: Matrix3x4::identity(),
                q: Matrix4::identity(),
            }),
        });

        let text = serde_json::to_string(&record).unwrap();
        let back: CalibrationRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
        assert!(back.is_phase2_complete());
        assert!(back.require_complete().is_ok());

        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["stereo"]["translationVector"][0][0], -142.1);
        assert_eq!(json["stereo"]["rectification"]["Q"][3][3], 1.0);
    }

    #[test]
    fn world_transform_defaults_to_identity() {
        let cam = intrinsics();
        let t = cam.world_transform();
        assert_eq!(t.rotation, Matrix3::identity());
        assert_eq!(t.translation, Vector3::zeros());
        assert!(!cam.has_world_transform());
    }

    #[test]
    fn world_transform_maps_world_points_into_the_camera() {
        // Camera sits 100 mm along world +x, turned 90 degrees about y.
        let rotation = Matrix3::new(0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        let centre = Vector3::new(100.0, 0.0, 0.0);
        let cam = CameraIntrinsics {
            world_rotation: Some(rotation),
            world_translation: Some(-rotation * centre),
            ..intrinsics()
        };
        let pose = cam.world_transform();

        assert!(pose.apply(&centre).norm() < 1e-12);
        let beside = pose.apply(&Vector3::new(100.0, 0.0, 50.0));
        assert!((beside - Vector3::new(-50.0, 0.0, 0.0)).norm() < 1e-12);
        let world = pose.inverse().apply(&Vector3::zeros());
        assert!((world - centre).norm() < 1e-12);
    }

    #[test]
    fn accepts_flat_matrices_and_world_transform() {
        let json = r#"{
            "cameraMatrix": [800, 0, 320, 0, 805, 240, 0, 0, 1],
            "distortionCoeffs": [0, 0, 0, 0, 0],
            "reprojectionError": 0.2,
            "numImages": 18,
            "imageWidth": 640,
            "imageHeight": 480,
            "worldRotation": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            "worldTranslation": [[10], [0], [0]]
        }"#;
        let cam: CameraIntrinsics = serde_json::from_str(json).unwrap();
        assert_eq!(cam.camera_matrix[(1, 2)], 240.0);
        assert_eq!(cam.world_translation, Some(Vector3::new(10.0, 0.0, 0.0)));
        assert!(cam.has_world_transform());
    }

    #[test]
    fn require_complete_names_missing_section() {
        let record = phase1_record();
        assert_eq!(
            record.require_complete().unwrap_err(),
            CalibrationError::MissingSection("stereo")
        );

        let mut empty = record.clone();
        empty.right_camera = None;
        assert_eq!(
            empty.require_complete().unwrap_err(),
            CalibrationError::IntrinsicsRequired(Side::Right)
        );
    }

    #[test]
    fn summary_reflects_phases() {
        let summary = phase1_record().summary();
        assert!(summary.phase1_complete);
        assert!(!summary.phase2_complete);
        assert_eq!(summary.left_images, 20);
        assert_eq!(summary.baseline_cm, None);
    }
}
