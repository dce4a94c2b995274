use std::path::{Path, PathBuf};

use image::GrayImage;
use log::debug;
use stk_core::{DeviceError, Resolution};

/// Anything that yields frames for one camera.
pub trait FrameSource: Send {
    fn id(&self) -> &str;

    /// Blocking read of the next frame.
    fn read(&mut self) -> Result<GrayImage, DeviceError>;
}

/// Frames replayed from a directory of images, in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    id: String,
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let dir = dir.as_ref();
        let id = dir.display().to_string();
        let files = stk_io::list_images(dir).map_err(|e| DeviceError::Open {
            camera: id.clone(),
            reason: e.to_string(),
        })?;
        if files.is_empty() {
            return Err(DeviceError::Open {
                camera: id,
                reason: "no images in directory".into(),
            });
        }
        debug!("{id}: {} frames", files.len());
        Ok(Self {
            id,
            files,
            next: 0,
            looping: false,
        })
    }

    /// Start again from the first file after the last one.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next.min(self.files.len())
    }

    /// Size of the first frame.
    pub fn resolution(&self) -> Result<Resolution, DeviceError> {
        let first = self.files.first().ok_or_else(|| DeviceError::Stalled(self.id.clone()))?;
        let image = stk_io::load_gray(first).map_err(|e| DeviceError::Open {
            camera: self.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Resolution::new(image.width(), image.height()))
    }
}

impl FrameSource for ImageSequenceSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> Result<GrayImage, DeviceError> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Err(DeviceError::Stalled(self.id.clone()));
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        stk_io::load_gray(path).map_err(|e| DeviceError::Open {
            camera: self.id.clone(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn write_sequence(dir: &Path, count: u8) {
        for i in 0..count {
            let frame = GrayImage::from_pixel(6, 4, Luma([i * 10]));
            stk_io::save_gray(dir.join(format!("frame_{i:03}.png")), &frame).unwrap();
        }
    }

    #[test]
    fn replays_frames_in_order_then_stalls() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 3);
        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.resolution().unwrap(), Resolution::new(6, 4));
        for i in 0..3u8 {
            assert_eq!(source.read().unwrap().get_pixel(0, 0).0[0], i * 10);
        }
        assert_eq!(source.remaining(), 0);
        assert!(matches!(source.read(), Err(DeviceError::Stalled(_))));
    }

    #[test]
    fn looping_restarts() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 2);
        let mut source = ImageSequenceSource::open(dir.path()).unwrap().looping(true);
        for _ in 0..2 {
            source.read().unwrap();
        }
        assert_eq!(source.read().unwrap().get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(DeviceError::Open { .. })
        ));
    }
}
