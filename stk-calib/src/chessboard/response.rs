//! ChESS X-junction response and peak picking.

use image::GrayImage;
use rayon::prelude::*;
use stk_core::Pt2;

/// 16 samples on a radius-5 ring, clockwise from 12 o'clock. Sample `n+4` is
/// `n` rotated by 90°, sample `n+8` is opposite `n`.
const RING: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (3, -3),
    (5, -2),
    (5, 0),
    (5, 2),
    (3, 3),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-3, 3),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-3, -3),
    (-2, -5),
];
pub(crate) const RING_RADIUS: u32 = 5;

/// Dense response map in row-major order.
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }
}

/// `R = SR - DR - 16·MR` at every pixel farther than the ring radius from the
/// border; zero elsewhere.
pub fn chess_response(img: &GrayImage) -> ResponseMap {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let r = RING_RADIUS as usize;
    let raw = img.as_raw();
    let px = |x: usize, y: usize| f32::from(raw[y * w + x]);

    let mut data = vec![0f32; w * h];
    if w > 2 * r && h > 2 * r {
        data.par_chunks_mut(w)
            .enumerate()
            .filter(|(y, _)| *y >= r && *y < h - r)
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate().take(w - r).skip(r) {
                    let mut s = [0f32; 16];
                    for (k, (dx, dy)) in RING.iter().enumerate() {
                        s[k] = px((x as i32 + dx) as usize, (y as i32 + dy) as usize);
                    }

                    let mut sum_resp = 0.0;
                    for n in 0..4 {
                        sum_resp += ((s[n] + s[n + 8]) - (s[n + 4] + s[n + 12])).abs();
                    }
                    let mut diff_resp = 0.0;
                    for n in 0..8 {
                        diff_resp += (s[n] - s[n + 8]).abs();
                    }
                    let ring_mean = s.iter().sum::<f32>() / 16.0;
                    let local_mean = (px(x, y)
                        + px(x - 1, y)
                        + px(x + 1, y)
                        + px(x, y - 1)
                        + px(x, y + 1))
                        / 5.0;
                    let mean_resp = (ring_mean - local_mean).abs();

                    *out = sum_resp - diff_resp - 16.0 * mean_resp;
                }
            });
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

/// Local maxima above `threshold`, strongest first. Plateaus resolve to the
/// first pixel in scan order.
pub fn find_peaks(map: &ResponseMap, threshold: f32, nms_radius: usize) -> Vec<(Pt2, f32)> {
    let (w, h) = (map.width, map.height);
    let mut peaks = Vec::new();
    for y in nms_radius..h.saturating_sub(nms_radius) {
        for x in nms_radius..w.saturating_sub(nms_radius) {
            let v = map.at(x, y);
            if v <= threshold {
                continue;
            }
            let mut is_max = true;
            'window: for ny in y - nms_radius..=y + nms_radius {
                for nx in x - nms_radius..=x + nms_radius {
                    if (nx, ny) == (x, y) {
                        continue;
                    }
                    let n = map.at(nx, ny);
                    let earlier = (ny, nx) < (y, x);
                    if n > v || (n == v && earlier) {
                        is_max = false;
                        break 'window;
                    }
                }
            }
            if is_max {
                peaks.push((Pt2::new(x as f64, y as f64), v));
            }
        }
    }
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn x_junction(cx: u32, cy: u32) -> GrayImage {
        GrayImage::from_fn(41, 41, |x, y| {
            let dark = (x < cx) ^ (y < cy);
            Luma([if dark { 30 } else { 220 }])
        })
    }

    #[test]
    fn ring_is_rotationally_consistent() {
        for n in 0..4 {
            let (x, y) = RING[n];
            assert_eq!(RING[n + 4], (-y, x));
            assert_eq!(RING[n + 8], (-x, -y));
        }
    }

    #[test]
    fn peak_sits_on_the_junction() {
        let img = x_junction(20, 20);
        let map = chess_response(&img);
        let peaks = find_peaks(&map, 0.2 * map.max(), 3);
        assert_eq!(peaks.len(), 1);
        let (p, _) = peaks[0];
        assert!((p.x - 19.5).abs() <= 1.0 && (p.y - 19.5).abs() <= 1.0, "{p:?}");
    }

    #[test]
    fn edges_and_flat_regions_do_not_respond() {
        let edge = GrayImage::from_fn(41, 41, |x, _| Luma([if x < 20 { 30 } else { 220 }]));
        let map = chess_response(&edge);
        assert!(map.max() <= 0.0);
    }
}
