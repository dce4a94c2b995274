//! Checkerboard corner detection.
//!
//! Pipeline: adaptive-threshold gate, ChESS X-junction response, non-maximum
//! suppression, lattice growth into the expected `cols x rows` grid, then
//! iterative sub-pixel refinement. Corners come back row-major in the same
//! order as [`BoardGeometry::object_points`].

mod grid;
mod overlay;
mod response;
mod subpix;
mod threshold;

pub use grid::assemble;
pub use overlay::draw_corners;
pub use response::{ResponseMap, chess_response, find_peaks};
pub use subpix::{SubPixParams, refine};
pub use threshold::{adaptive_threshold, dark_fraction};

use image::{GrayImage, RgbImage};
use log::debug;
use stk_core::{BoardGeometry, Pt2};

#[derive(Debug, Clone, PartialEq)]
pub struct FinderParams {
    /// Peaks below this fraction of the strongest response are discarded.
    pub relative_threshold: f32,
    pub nms_radius: usize,
    /// Reject frames whose thresholded dark fraction falls outside this range.
    pub dark_fraction: (f64, f64),
    pub threshold_offset: u8,
    pub subpix: SubPixParams,
}

impl Default for FinderParams {
    fn default() -> Self {
        Self {
            relative_threshold: 0.15,
            nms_radius: 3,
            dark_fraction: (0.005, 0.6),
            threshold_offset: 10,
            subpix: SubPixParams::default(),
        }
    }
}

/// Result of one detection attempt, with the frame annotated for display.
#[derive(Debug, Clone)]
pub struct BoardDetection {
    pub found: bool,
    pub corners: Vec<Pt2>,
    pub overlay: RgbImage,
}

#[derive(Debug, Clone)]
pub struct ChessboardFinder {
    board: BoardGeometry,
    params: FinderParams,
}

impl ChessboardFinder {
    pub fn new(board: BoardGeometry) -> Self {
        Self::with_params(board, FinderParams::default())
    }

    pub fn with_params(board: BoardGeometry, params: FinderParams) -> Self {
        Self { board, params }
    }

    pub fn board(&self) -> &BoardGeometry {
        &self.board
    }

    fn passes_fast_check(&self, frame: &GrayImage) -> bool {
        let radius = (frame.width().min(frame.height()) / 40).max(3);
        let binary = adaptive_threshold(frame, radius, self.params.threshold_offset);
        let dark = dark_fraction(&binary);
        let (lo, hi) = self.params.dark_fraction;
        if dark < lo || dark > hi {
            debug!("fast check rejected frame: dark fraction {dark:.4}");
            return false;
        }
        true
    }

    fn candidates(&self, frame: &GrayImage) -> Vec<Pt2> {
        let map = chess_response(frame);
        let strongest = map.max();
        if strongest <= 0.0 {
            return Vec::new();
        }
        let mut peaks = find_peaks(
            &map,
            self.params.relative_threshold * strongest,
            self.params.nms_radius,
        );
        peaks.truncate(self.board.corner_count() * 4);
        peaks.into_iter().map(|(p, _)| p).collect()
    }

    /// Ordered, sub-pixel refined corners, or `None` when the full board is
    /// not visible.
    pub fn find(&self, frame: &GrayImage) -> Option<Vec<Pt2>> {
        if frame.width() < 16 || frame.height() < 16 || !self.passes_fast_check(frame) {
            return None;
        }
        let candidates = self.candidates(frame);
        if candidates.len() < self.board.corner_count() {
            debug!(
                "only {} corner candidates for a {}x{} board",
                candidates.len(),
                self.board.cols,
                self.board.rows
            );
            return None;
        }
        let coarse = assemble(&candidates, self.board.cols, self.board.rows)?;
        Some(
            coarse
                .into_iter()
                .map(|p| refine(frame, p, &self.params.subpix))
                .collect(),
        )
    }

    /// [`find`](Self::find) plus an overlay for the operator.
    pub fn detect(&self, frame: &GrayImage) -> BoardDetection {
        match self.find(frame) {
            Some(corners) => BoardDetection {
                overlay: draw_corners(frame, &corners, self.board.cols, true),
                found: true,
                corners,
            },
            None => BoardDetection {
                overlay: draw_corners(frame, &[], self.board.cols, false),
                found: false,
                corners: Vec::new(),
            },
        }
    }
}
