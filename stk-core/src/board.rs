//! Planar checkerboard geometry and per-frame correspondences.

use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, ConfigError};
use crate::types::{Pt2, Pt3};

/// Checkerboard described by its internal corner grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardGeometry {
    /// Internal corners per row.
    pub cols: usize,
    /// Internal corners per column.
    pub rows: usize,
    pub square_size_mm: f64,
}

impl Default for BoardGeometry {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size_mm: 25.0,
        }
    }
}

impl BoardGeometry {
    pub fn new(cols: usize, rows: usize, square_size_mm: f64) -> Result<Self, ConfigError> {
        let board = Self {
            cols,
            rows,
            square_size_mm,
        };
        board.validate()?;
        Ok(board)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols < 2 || self.rows < 2 {
            return Err(ConfigError::Invalid(format!(
                "board needs at least 2x2 internal corners, got {}x{}",
                self.cols, self.rows
            )));
        }
        if self.square_size_mm.is_nan() || self.square_size_mm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "square size must be positive, got {}",
                self.square_size_mm
            )));
        }
        Ok(())
    }

    pub fn corner_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Board-local corner positions (Z = 0), row-major, millimetres.
    pub fn object_points(&self) -> Vec<Pt3> {
        let mut points = Vec::with_capacity(self.corner_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                points.push(Pt3::new(
                    c as f64 * self.square_size_mm,
                    r as f64 * self.square_size_mm,
                    0.0,
                ));
            }
        }
        points
    }
}

/// Object/image point pairs for one captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSet {
    object_points: Vec<Pt3>,
    image_points: Vec<Pt2>,
}

impl CorrespondenceSet {
    pub fn new(object_points: Vec<Pt3>, image_points: Vec<Pt2>) -> Result<Self, CalibrationError> {
        if object_points.len() != image_points.len() {
            return Err(CalibrationError::CorrespondenceMismatch {
                expected: object_points.len(),
                got: image_points.len(),
            });
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    /// Pair detected corners with the board's object points.
    pub fn for_board(board: &BoardGeometry, corners: Vec<Pt2>) -> Result<Self, CalibrationError> {
        Self::new(board.object_points(), corners)
    }

    pub fn object_points(&self) -> &[Pt3] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Pt2] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}
