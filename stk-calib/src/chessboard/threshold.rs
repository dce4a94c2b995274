//! Adaptive thresholding used as a cheap "is there a board at all" gate.

use image::{GrayImage, Luma};

/// Summed-area table with a zero guard row and column.
pub(crate) struct Integral {
    width: usize,
    sums: Vec<u64>,
}

impl Integral {
    pub(crate) fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += u64::from(img.get_pixel(x as u32, y as u32)[0]);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { width: w, sums }
    }

    /// Sum over the inclusive box `[x0, x1] x [y0, y1]`.
    pub(crate) fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let stride = self.width + 1;
        let a = self.sums[y0 * stride + x0];
        let b = self.sums[y0 * stride + x1 + 1];
        let c = self.sums[(y1 + 1) * stride + x0];
        let d = self.sums[(y1 + 1) * stride + x1 + 1];
        d + a - b - c
    }
}

/// Binarize against the local box mean: a pixel is dark (0) when it sits more
/// than `offset` below the mean of its `(2r+1)²` neighbourhood.
pub fn adaptive_threshold(img: &GrayImage, radius: u32, offset: u8) -> GrayImage {
    let (w, h) = img.dimensions();
    let integral = Integral::new(img);
    let r = radius as usize;
    GrayImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let x0 = x.saturating_sub(r);
        let y0 = y.saturating_sub(r);
        let x1 = (x + r).min(w as usize - 1);
        let y1 = (y + r).min(h as usize - 1);
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as u64;
        let mean = integral.box_sum(x0, y0, x1, y1) / area;
        let value = u64::from(img.get_pixel(x as u32, y as u32)[0]);
        if value + u64::from(offset) < mean {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Fraction of dark pixels after adaptive thresholding. A frame with no
/// board has almost none, a washed-out or fully dark frame has too many.
pub fn dark_fraction(binary: &GrayImage) -> f64 {
    let total = (binary.width() * binary.height()).max(1) as f64;
    let dark = binary.pixels().filter(|p| p[0] == 0).count() as f64;
    dark / total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_sum_matches_direct_sum() {
        let img = GrayImage::from_fn(7, 5, |x, y| Luma([(x * 10 + y) as u8]));
        let integral = Integral::new(&img);
        let mut direct = 0u64;
        for y in 1..=3 {
            for x in 2..=5 {
                direct += u64::from(img.get_pixel(x, y)[0]);
            }
        }
        assert_eq!(integral.box_sum(2, 1, 5, 3), direct);
    }

    #[test]
    fn uniform_image_has_no_dark_pixels() {
        let img = GrayImage::from_pixel(40, 30, Luma([128]));
        let binary = adaptive_threshold(&img, 5, 10);
        assert_eq!(dark_fraction(&binary), 0.0);
    }

    #[test]
    fn dark_square_on_white_is_dark() {
        let img = GrayImage::from_fn(40, 40, |x, y| {
            if (15..25).contains(&x) && (15..25).contains(&y) {
                Luma([20])
            } else {
                Luma([230])
            }
        });
        let binary = adaptive_threshold(&img, 7, 10);
        assert_eq!(binary.get_pixel(16, 16)[0], 0);
        assert_eq!(binary.get_pixel(2, 2)[0], 255);
    }
}
