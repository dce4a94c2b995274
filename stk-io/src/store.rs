//! JSON persistence of the calibration record.
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write never leaves a truncated record behind and a failed stereo
//! phase cannot clobber the per-camera results.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use stk_core::{
    BoardGeometry, CalibrationRecord, CameraIds, CameraIntrinsics, Resolution, StereoExtrinsics,
};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<CalibrationRecord> {
        let text = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let record: CalibrationRecord =
            serde_json::from_str(&text).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        record
            .board_config
            .validate()
            .map_err(|e| StoreError::Incomplete(e.to_string()))?;
        debug!(
            "loaded calibration record {} (phase1={}, phase2={})",
            self.path.display(),
            record.is_phase1_complete(),
            record.is_phase2_complete()
        );
        Ok(record)
    }

    /// Persist `record` atomically.
    pub fn save(&self, record: &CalibrationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(record).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    /// Store both cameras' intrinsics. Any previous stereo section is
    /// dropped since it was solved against the old intrinsics.
    pub fn save_phase1(
        &self,
        board: BoardGeometry,
        camera_ids: CameraIds,
        resolution: Resolution,
        left: CameraIntrinsics,
        right: CameraIntrinsics,
    ) -> Result<CalibrationRecord> {
        let mut record = CalibrationRecord::new(board, camera_ids, resolution);
        record.left_camera = Some(left);
        record.right_camera = Some(right);
        self.save(&record)?;
        info!("saved phase 1 calibration to {}", self.path.display());
        Ok(record)
    }

    /// Attach the stereo section to an existing phase-1 record.
    pub fn save_stereo(&self, stereo: StereoExtrinsics) -> Result<CalibrationRecord> {
        let mut record = self.load()?;
        if !record.is_phase1_complete() {
            return Err(StoreError::Incomplete(
                "stereo calibration needs both cameras' intrinsics".into(),
            ));
        }
        record.stereo = Some(stereo);
        self.save(&record)?;
        info!("saved stereo calibration to {}", self.path.display());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            camera_matrix: Matrix3::new(810.0, 0.0, 322.0, 0.0, 805.0, 238.0, 0.0, 0.0, 1.0),
            distortion_coeffs: [-0.08, 0.02, 0.0, 0.0, 0.0],
            reprojection_error: 0.04,
            num_images: 20,
            image_width: 640,
            image_height: 480,
            world_rotation: None,
            world_translation: None,
        }
    }

    fn stereo() -> StereoExtrinsics {
        StereoExtrinsics {
            rotation_matrix: Matrix3::identity(),
            translation_vector: Vector3::new(-142.1, 0.0, 0.0),
            essential_matrix: Matrix3::zeros(),
            fundamental_matrix: Matrix3::zeros(),
            rms_error: 0.2,
            baseline_cm: 14.21,
            num_pairs: 10,
            rectification: None,
        }
    }

    fn phase1(store: &CalibrationStore) -> CalibrationRecord {
        store
            .save_phase1(
                BoardGeometry::new(7, 7, 30.0).unwrap(),
                CameraIds {
                    left: "0".into(),
                    right: "1".into(),
                },
                Resolution::new(640, 480),
                intrinsics(),
                intrinsics(),
            )
            .unwrap()
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("calib.json"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn phase1_then_stereo_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("nested/calib.json"));

        let saved = phase1(&store);
        let loaded = store.load().unwrap();
        assert_eq!(loaded, saved);
        assert!(loaded.stereo.is_none());

        let full = store.save_stereo(stereo()).unwrap();
        assert!(full.is_phase2_complete());
        assert_eq!(store.load().unwrap(), full);
        assert!(!dir.path().join("nested/calib.json.tmp").exists());
    }

    #[test]
    fn stereo_without_phase1_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("calib.json"));
        let mut record = CalibrationRecord::new(
            BoardGeometry::default(),
            CameraIds::default(),
            Resolution::new(640, 480),
        );
        record.left_camera = Some(intrinsics());
        store.save(&record).unwrap();

        assert!(matches!(
            store.save_stereo(stereo()),
            Err(StoreError::Incomplete(_))
        ));
        // The partial record is untouched.
        assert_eq!(store.load().unwrap(), record);
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.json");
        fs::write(&path, "{ \"boardConfig\": ").unwrap();
        let store = CalibrationStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn phase1_recalibration_drops_stale_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("calib.json"));
        phase1(&store);
        store.save_stereo(stereo()).unwrap();

        let redone = phase1(&store);
        assert!(redone.stereo.is_none());
        assert!(!store.load().unwrap().is_phase2_complete());
    }
}
