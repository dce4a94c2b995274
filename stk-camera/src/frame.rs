use std::time::Instant;

use image::GrayImage;
use image::imageops;
use serde::{Deserialize, Serialize};

/// One captured image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Per-camera capture counter, starting at 1. Zero marks a placeholder.
    pub sequence: u64,
    pub captured_at: Instant,
    pub image: GrayImage,
}

impl Frame {
    pub fn new(sequence: u64, image: GrayImage) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            image,
        }
    }

    /// Black placeholder returned when no frame is ready.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(0, GrayImage::new(width, height))
    }

    pub fn is_blank(&self) -> bool {
        self.sequence == 0
    }
}

/// How a camera is mounted relative to the keyboard. Applied once, straight
/// after capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Orientation {
    pub rotate_180: bool,
    pub mirror: bool,
}

impl Orientation {
    pub fn is_identity(&self) -> bool {
        !self.rotate_180 && !self.mirror
    }

    pub fn apply(&self, image: GrayImage) -> GrayImage {
        let image = if self.rotate_180 {
            imageops::rotate180(&image)
        } else {
            image
        };
        if self.mirror {
            imageops::flip_horizontal(&image)
        } else {
            image
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp() -> GrayImage {
        GrayImage::from_fn(4, 3, |x, y| Luma([(10 * x + y) as u8]))
    }

    #[test]
    fn rotate_moves_corner_to_corner() {
        let out = Orientation {
            rotate_180: true,
            mirror: false,
        }
        .apply(ramp());
        assert_eq!(out.get_pixel(0, 0).0[0], 32);
        assert_eq!(out.get_pixel(3, 2).0[0], 0);
    }

    #[test]
    fn mirror_flips_columns() {
        let out = Orientation {
            rotate_180: false,
            mirror: true,
        }
        .apply(ramp());
        assert_eq!(out.get_pixel(0, 1).0[0], 31);
    }

    #[test]
    fn rotate_and_mirror_is_vertical_flip() {
        let both = Orientation {
            rotate_180: true,
            mirror: true,
        };
        let out = both.apply(ramp());
        assert_eq!(out, imageops::flip_vertical(&ramp()));
        assert!(Orientation::default().is_identity());
        assert_eq!(Orientation::default().apply(ramp()), ramp());
    }

    #[test]
    fn blank_frame_is_placeholder() {
        let frame = Frame::blank(8, 4);
        assert!(frame.is_blank());
        assert_eq!(frame.image.dimensions(), (8, 4));
        assert!(!Frame::new(1, ramp()).is_blank());
    }
}
