//! The two calibration phases over directories of captured images.

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use clap::Args;
use log::{debug, info, warn};
use stk_calib::{CalibrationSettings, CameraCalibrator, StereoCalibrator};
use stk_core::{BoardGeometry, CameraIds, CameraIntrinsics, Resolution, Side};
use stk_io::{CalibrationStore, FrameArchive, list_images, load_gray};

use crate::CalibrationOptions;
use crate::prompt::{Answer, Prompt};

#[derive(Debug, Args)]
pub struct IntrinsicsArgs {
    /// Directory of left camera images.
    #[arg(long)]
    pub left: PathBuf,

    /// Directory of right camera images.
    #[arg(long)]
    pub right: PathBuf,

    #[arg(long, default_value = "calibration.json")]
    pub calibration: PathBuf,

    /// Drop views whose error exceeds the recapture limit and solve again.
    #[arg(long)]
    pub prune: bool,

    #[command(flatten)]
    pub options: CalibrationOptions,
}

#[derive(Debug, Args)]
pub struct StereoArgs {
    /// Directory of left images, paired with the right ones by file order.
    #[arg(long)]
    pub left: PathBuf,

    #[arg(long)]
    pub right: PathBuf,

    /// Phase-1 calibration to extend.
    #[arg(long, default_value = "calibration.json")]
    pub calibration: PathBuf,

    #[command(flatten)]
    pub options: CalibrationOptions,
}

fn camera_id(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn frame_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let files = list_images(dir)?;
    ensure!(!files.is_empty(), "no images in {}", dir.display());
    Ok(files)
}

pub fn intrinsics(args: &IntrinsicsArgs) -> anyhow::Result<()> {
    let board = args.options.board()?;
    let settings = args.options.settings()?;
    let mut prompt = args.options.interactive.then(Prompt::stdin);

    let mut solved = Vec::with_capacity(2);
    let mut resolution: Option<Resolution> = None;
    for (side, dir) in [(Side::Left, &args.left), (Side::Right, &args.right)] {
        let (intrinsics, size) = calibrate_camera(
            side,
            dir,
            board,
            &settings,
            args.options.archive.as_deref(),
            args.prune,
            &mut prompt,
        )
        .with_context(|| format!("{side} camera calibration failed"))?;
        if let Some(previous) = resolution {
            ensure!(
                previous == size,
                "cameras disagree on resolution: {}x{} vs {}x{}",
                previous.width,
                previous.height,
                size.width,
                size.height
            );
        }
        resolution = Some(size);
        solved.push(intrinsics);
    }

    let (Some(right), Some(left), Some(resolution)) = (solved.pop(), solved.pop(), resolution) else {
        anyhow::bail!("both cameras must be calibrated");
    };
    let ids = CameraIds {
        left: camera_id(&args.left),
        right: camera_id(&args.right),
    };
    let store = CalibrationStore::new(&args.calibration);
    let record = store.save_phase1(board, ids, resolution, left, right)?;
    println!("{}", serde_json::to_string_pretty(&record.summary())?);
    Ok(())
}

fn calibrate_camera(
    side: Side,
    dir: &Path,
    board: BoardGeometry,
    settings: &CalibrationSettings,
    archive: Option<&Path>,
    prune: bool,
    prompt: &mut Option<Prompt<std::io::StdinLock<'static>>>,
) -> anyhow::Result<(CameraIntrinsics, Resolution)> {
    let files = frame_files(dir)?;
    let first = load_gray(&files[0])?;
    let resolution = Resolution::new(first.width(), first.height());

    let mut calibrator = CameraCalibrator::new(side, board, resolution, settings.clone());
    if let Some(dir) = archive {
        calibrator = calibrator.with_archive(FrameArchive::new(dir));
    }

    for path in &files {
        if calibrator.capture_count() >= settings.max_images {
            info!("{side}: reached {} views, ignoring the rest", settings.max_images);
            break;
        }
        let frame = load_gray(path)?;
        let detection = calibrator.detect(&frame);
        if !detection.found {
            debug!("{side}: no board in {}", path.display());
            continue;
        }
        if let Some(prompt) = prompt.as_mut() {
            match prompt.ask(&format!("{side} {}", path.display()))? {
                Answer::Capture => {}
                Answer::Skip => continue,
                Answer::Finish => break,
            }
        }
        if let Err(e) = calibrator.capture(&frame, detection.corners) {
            warn!("{side}: {} rejected: {e}", path.display());
        }
    }
    info!("{side}: {} usable views", calibrator.capture_count());

    let mut intrinsics = calibrator.calibrate()?;
    if prune {
        let worst: Vec<usize> = calibrator
            .view_errors()
            .iter()
            .enumerate()
            .filter(|(_, e)| **e > settings.max_reprojection_error)
            .map(|(i, _)| i)
            .collect();
        if !worst.is_empty() && calibrator.capture_count() - worst.len() >= settings.min_images {
            for &i in worst.iter().rev() {
                calibrator.remove_capture(i);
            }
            info!("{side}: dropped {} views, solving again", worst.len());
            intrinsics = calibrator.calibrate()?;
        } else if !worst.is_empty() {
            warn!(
                "{side}: {} views above {:.1} px but too few would remain to drop them",
                worst.len(),
                settings.max_reprojection_error
            );
        }
    }
    for (i, error) in calibrator.view_errors().iter().enumerate() {
        debug!("{side} view {i}: {error:.4} px");
    }
    Ok((intrinsics, resolution))
}

pub fn stereo(args: &StereoArgs) -> anyhow::Result<()> {
    let store = CalibrationStore::new(&args.calibration);
    let record = store
        .load()
        .with_context(|| format!("reading phase 1 calibration {}", args.calibration.display()))?;
    let board = record.board_config;
    if board != args.options.board()? {
        info!(
            "using the {}x{} board stored with phase 1",
            board.cols, board.rows
        );
    }
    let settings = args.options.settings()?;
    let mut calibrator = StereoCalibrator::from_record(&record, settings.clone())?;
    if let Some(dir) = &args.options.archive {
        calibrator = calibrator.with_archive(FrameArchive::new(dir));
    }
    let mut prompt = args.options.interactive.then(Prompt::stdin);

    let left_files = frame_files(&args.left)?;
    let right_files = frame_files(&args.right)?;
    if left_files.len() != right_files.len() {
        warn!(
            "{} left and {} right images; extra frames are ignored",
            left_files.len(),
            right_files.len()
        );
    }

    for (left_path, right_path) in left_files.iter().zip(&right_files) {
        if calibrator.pair_count() >= settings.max_pairs {
            info!("reached {} pairs, ignoring the rest", settings.max_pairs);
            break;
        }
        let left = load_gray(left_path)?;
        let right = load_gray(right_path)?;
        let detection = calibrator.detect_pair(&left, &right);
        if !detection.both_found {
            debug!("board not visible to both cameras in {}", left_path.display());
            continue;
        }
        if let Some(prompt) = prompt.as_mut() {
            match prompt.ask(&format!("pair {}", left_path.display()))? {
                Answer::Capture => {}
                Answer::Skip => continue,
                Answer::Finish => break,
            }
        }
        if let Err(e) = calibrator.capture_pair(&left, &right, &detection) {
            warn!("pair {} rejected: {e}", left_path.display());
        }
    }
    info!("{} usable pairs", calibrator.pair_count());

    // Nothing is written unless both solves succeed.
    calibrator.calibrate()?;
    calibrator.compute_rectification()?;
    let extrinsics = calibrator
        .extrinsics()
        .cloned()
        .context("stereo solve produced no extrinsics")?;
    let record = store.save_stereo(extrinsics)?;
    println!("{}", serde_json::to_string_pretty(&record.summary())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn camera_id_is_the_directory_name() {
        assert_eq!(camera_id(Path::new("captures/left")), "left");
        assert_eq!(camera_id(Path::new("/")), "/");
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(frame_files(dir.path()).is_err());
        stk_io::save_gray(dir.path().join("000.png"), &GrayImage::new(4, 4)).unwrap();
        assert_eq!(frame_files(dir.path()).unwrap().len(), 1);
    }

    fn options() -> CalibrationOptions {
        CalibrationOptions {
            board_cols: 9,
            board_rows: 6,
            square_mm: 25.0,
            settings: None,
            archive: None,
            interactive: false,
        }
    }

    #[test]
    fn intrinsics_without_boards_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for side in ["left", "right"] {
            stk_io::save_gray(dir.path().join(side).join("000.png"), &GrayImage::new(64, 48))
                .unwrap();
        }
        let args = IntrinsicsArgs {
            left: dir.path().join("left"),
            right: dir.path().join("right"),
            calibration: dir.path().join("calibration.json"),
            prune: false,
            options: options(),
        };
        let err = intrinsics(&args).unwrap_err();
        assert!(format!("{err:#}").contains("left camera calibration failed"));
        assert!(!args.calibration.exists());
    }

    #[test]
    fn stereo_without_phase1_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = StereoArgs {
            left: dir.path().join("left"),
            right: dir.path().join("right"),
            calibration: dir.path().join("calibration.json"),
            options: options(),
        };
        assert!(stereo(&args).is_err());
        assert!(!args.calibration.exists());
    }
}
