//! Iterative saddle-point refinement of corner locations.
//!
//! Every pixel `q` in a window around the corner `p` satisfies
//! `∇I(q) · (q - p) ≈ 0`: either the gradient vanishes (flat region) or `q`
//! lies on an edge through `p`. Solving the weighted normal equations for `p`
//! and iterating converges to the saddle point.

use image::GrayImage;
use stk_core::Pt2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPixParams {
    /// Half side of the search window; the window is `2n+1` pixels wide.
    pub half_window: i32,
    pub max_iterations: usize,
    /// Stop once a step moves the corner less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iterations: 30,
            epsilon: 0.001,
        }
    }
}

fn sample(img: &GrayImage, x: f64, y: f64) -> f64 {
    let max_x = f64::from(img.width() - 1);
    let max_y = f64::from(img.height() - 1);
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);
    let p = |x: u32, y: u32| f64::from(img.get_pixel(x, y)[0]);
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Refine one corner. Returns the start point unchanged when the solution
/// leaves the window or the system is singular.
pub fn refine(img: &GrayImage, start: Pt2, params: &SubPixParams) -> Pt2 {
    let win = params.half_window;
    let inv_win_sq = 1.0 / f64::from(win * win);
    let mut current = start;

    for _ in 0..params.max_iterations {
        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        let (mut bb1, mut bb2) = (0.0, 0.0);

        for dy in -win..=win {
            for dx in -win..=win {
                let (fx, fy) = (f64::from(dx), f64::from(dy));
                let weight = (-(fx * fx + fy * fy) * inv_win_sq).exp();
                let (qx, qy) = (current.x + fx, current.y + fy);
                let gx = 0.5 * (sample(img, qx + 1.0, qy) - sample(img, qx - 1.0, qy));
                let gy = 0.5 * (sample(img, qx, qy + 1.0) - sample(img, qx, qy - 1.0));

                let gxx = gx * gx * weight;
                let gxy = gx * gy * weight;
                let gyy = gy * gy * weight;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * fx + gxy * fy;
                bb2 += gxy * fx + gyy * fy;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            break;
        }
        let step_x = (c * bb1 - b * bb2) / det;
        let step_y = (a * bb2 - b * bb1) / det;
        current = Pt2::new(current.x + step_x, current.y + step_y);

        if step_x * step_x + step_y * step_y < params.epsilon * params.epsilon {
            break;
        }
    }

    let win = f64::from(win);
    if (current.x - start.x).abs() > win || (current.y - start.y).abs() > win {
        start
    } else {
        current
    }
}
