//! Per-pixel rectification lookup tables.

use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Matrix3x4, Vector3};
use ndarray::Array2;
use rayon::prelude::*;
use stk_core::{CameraModel, PinholeCamera, Pt2, StkError};

/// Two image-sized float arrays giving, for every pixel of one image, a
/// coordinate in another. Entries that have no counterpart are NaN.
#[derive(Debug, Clone)]
pub struct RemapTable {
    map_x: Array2<f32>,
    map_y: Array2<f32>,
}

impl RemapTable {
    /// Build a `height × width` table by evaluating `f` at every pixel, one
    /// row per rayon task.
    fn build<F>(width: usize, height: usize, f: F) -> Result<Self, StkError>
    where
        F: Fn(f64, f64) -> Option<Pt2> + Sync,
    {
        let mut xs = vec![f32::NAN; width * height];
        let mut ys = vec![f32::NAN; width * height];
        xs.par_chunks_mut(width.max(1))
            .zip(ys.par_chunks_mut(width.max(1)))
            .enumerate()
            .for_each(|(v, (row_x, row_y))| {
                for (u, (x, y)) in row_x.iter_mut().zip(row_y.iter_mut()).enumerate() {
                    if let Some(p) = f(u as f64, v as f64) {
                        *x = p.x as f32;
                        *y = p.y as f32;
                    }
                }
            });

        let shape = (height, width);
        let map_x = Array2::from_shape_vec(shape, xs)
            .map_err(|e| StkError::Numerical(format!("remap table shape: {e}")))?;
        let map_y = Array2::from_shape_vec(shape, ys)
            .map_err(|e| StkError::Numerical(format!("remap table shape: {e}")))?;
        Ok(Self { map_x, map_y })
    }

    /// Rectified pixel → raw pixel, the table used to resample whole frames.
    pub fn inverse(
        camera: &PinholeCamera,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
    ) -> Result<Self, StkError> {
        let (width, height) = camera.image_size();
        let (f_x, f_y) = (projection[(0, 0)], projection[(1, 1)]);
        let (c_x, c_y) = (projection[(0, 2)], projection[(1, 2)]);
        let back = rotation.transpose();
        Self::build(width, height, |u, v| {
            let ray = back * Vector3::new((u - c_x) / f_x, (v - c_y) / f_y, 1.0);
            let (x, y) = camera.project(&ray)?;
            Some(Pt2::new(x, y))
        })
    }

    /// Raw pixel → rectified pixel, for looking up single points.
    pub fn forward<F>(camera: &PinholeCamera, rectify: F) -> Result<Self, StkError>
    where
        F: Fn(&Pt2) -> Option<Pt2> + Sync,
    {
        let (width, height) = camera.image_size();
        Self::build(width, height, |u, v| rectify(&Pt2::new(u, v)))
    }

    /// `(width, height)`
    pub fn size(&self) -> (usize, usize) {
        let (rows, cols) = self.map_x.dim();
        (cols, rows)
    }

    /// Table entry at the nearest integer pixel, `None` outside the table or
    /// where the entry is undefined.
    pub fn lookup(&self, point: &Pt2) -> Option<Pt2> {
        let (u, v) = (point.x.round(), point.y.round());
        if u < 0.0 || v < 0.0 {
            return None;
        }
        let index = [v as usize, u as usize];
        let x = *self.map_x.get(index)?;
        let y = *self.map_y.get(index)?;
        (x.is_finite() && y.is_finite()).then(|| Pt2::new(x as f64, y as f64))
    }

    /// Resample `frame` through the table with bilinear interpolation.
    /// Output pixels that map outside the source are black.
    pub fn apply(&self, frame: &GrayImage) -> GrayImage {
        let (width, height) = self.size();
        let mut data = vec![0u8; width * height];
        data.par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(v, row)| {
                for (u, out) in row.iter_mut().enumerate() {
                    let (x, y) = (self.map_x[[v, u]], self.map_y[[v, u]]);
                    if let Some(value) = bilinear(frame, x, y) {
                        *out = value;
                    }
                }
            });
        GrayImage::from_raw(width as u32, height as u32, data)
            .unwrap_or_else(|| GrayImage::new(width as u32, height as u32))
    }
}

fn bilinear(frame: &GrayImage, x: f32, y: f32) -> Option<u8> {
    let (w, h) = frame.dimensions();
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return None;
    }
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    if x0 + 1 >= w || y0 + 1 >= h {
        // Allow sampling exactly on the last row/column.
        if x0 < w && y0 < h && x.fract() == 0.0 && y.fract() == 0.0 {
            let Luma([value]) = *frame.get_pixel(x0, y0);
            return Some(value);
        }
        return None;
    }
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let px = |dx: u32, dy: u32| frame.get_pixel(x0 + dx, y0 + dy).0[0] as f32;
    let top = px(0, 0) * (1.0 - fx) + px(1, 0) * fx;
    let bottom = px(0, 1) * (1.0 - fx) + px(1, 1) * fx;
    Some((top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8)
}
