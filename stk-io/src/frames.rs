//! Grayscale frame files: audit captures and recorded sequences.

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::debug;

use crate::error::{Result, StoreError};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "pgm", "tif"];

/// Decode any supported image file to 8-bit grayscale.
pub fn load_gray<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => StoreError::io(path, io),
        other => StoreError::Image(other),
    })?;
    Ok(img.into_luma8())
}

pub fn save_gray<P: AsRef<Path>>(path: P, frame: &GrayImage) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    frame.save(path)?;
    Ok(())
}

/// Image files in `dir`, sorted by file name.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Directory that keeps every raw frame accepted for calibration.
#[derive(Debug, Clone)]
pub struct FrameArchive {
    dir: PathBuf,
}

impl FrameArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `frame` as `<label>_<index>.png` and return its path.
    pub fn store(&self, label: &str, index: usize, frame: &GrayImage) -> Result<PathBuf> {
        let path = self.dir.join(format!("{label}_{index:03}.png"));
        save_gray(&path, frame)?;
        debug!("archived frame {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn archive_roundtrips_frames() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FrameArchive::new(dir.path().join("captures"));
        let frame = GrayImage::from_fn(16, 8, |x, y| Luma([(x * 8 + y) as u8]));

        let path = archive.store("left", 3, &frame).unwrap();
        assert!(path.ends_with("left_003.png"));
        assert_eq!(load_gray(&path).unwrap(), frame);
    }

    #[test]
    fn list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let frame = GrayImage::from_pixel(4, 4, Luma([9]));
        save_gray(dir.path().join("b.png"), &frame).unwrap();
        save_gray(dir.path().join("a.png"), &frame).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let names: Vec<_> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn missing_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_gray(dir.path().join("nope.png")),
            Err(StoreError::NotFound(_))
        ));
    }
}
