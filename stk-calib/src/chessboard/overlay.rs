//! Operator feedback image: detected corners drawn over the frame.

use image::{GrayImage, Rgb, RgbImage};
use stk_core::Pt2;

const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 160, 255]),
    Rgb([200, 0, 255]),
];
const MISS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(img: &mut RgbImage, a: Pt2, b: Pt2, color: Rgb<u8>) {
    let steps = (b - a).norm().ceil().max(1.0) as usize;
    for s in 0..=steps {
        let t = s as f64 / steps as f64;
        let p = a + (b - a) * t;
        put(img, p.x.round() as i64, p.y.round() as i64, color);
    }
}

fn draw_cross(img: &mut RgbImage, p: Pt2, half: i64, color: Rgb<u8>) {
    let (x, y) = (p.x.round() as i64, p.y.round() as i64);
    for d in -half..=half {
        put(img, x + d, y + d, color);
        put(img, x + d, y - d, color);
    }
}

/// Draw an ordered corner grid (`cols` per row), or unordered candidates in
/// red when the board was not found.
pub fn draw_corners(frame: &GrayImage, corners: &[Pt2], cols: usize, found: bool) -> RgbImage {
    let mut out = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let v = frame.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    if !found || cols == 0 {
        for p in corners {
            draw_cross(&mut out, *p, 3, MISS_COLOR);
        }
        return out;
    }

    let mut prev: Option<Pt2> = None;
    for (k, p) in corners.iter().enumerate() {
        let color = ROW_COLORS[(k / cols) % ROW_COLORS.len()];
        if let Some(q) = prev {
            draw_line(&mut out, q, *p, color);
        }
        draw_cross(&mut out, *p, 4, color);
        prev = Some(*p);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn found_board_is_colored_per_row() {
        let frame = GrayImage::from_pixel(64, 64, Luma([100]));
        let corners = vec![
            Pt2::new(10.0, 10.0),
            Pt2::new(30.0, 10.0),
            Pt2::new(10.0, 30.0),
            Pt2::new(30.0, 30.0),
        ];
        let out = draw_corners(&frame, &corners, 2, true);
        assert_eq!(*out.get_pixel(10, 10), ROW_COLORS[0]);
        assert_eq!(*out.get_pixel(30, 30), ROW_COLORS[1]);
        assert_eq!(*out.get_pixel(60, 60), Rgb([100, 100, 100]));
    }

    #[test]
    fn crosses_near_the_border_are_clipped() {
        let frame = GrayImage::from_pixel(8, 8, Luma([0]));
        let out = draw_corners(&frame, &[Pt2::new(0.0, 0.0)], 1, false);
        assert_eq!(*out.get_pixel(0, 0), MISS_COLOR);
    }
}
