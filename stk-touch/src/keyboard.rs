use serde::{Deserialize, Serialize};
use stk_core::Pt2;

/// Placement of the virtual keyboard in the reference image.
pub trait KeyboardGeometry {
    fn key_count(&self) -> usize;

    /// Keyboard-local coordinates of an image point, or `None` if the point
    /// is not on the keyboard.
    fn intersect(&self, point: &Pt2) -> Option<Pt2>;

    fn key_index_at(&self, point: &Pt2) -> Option<usize>;

    /// Image row of the keyboard's lower edge.
    fn bottom_edge_y(&self) -> f64;
}

/// A single row of equal-width keys in an axis-aligned image rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStrip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub keys: usize,
}

impl KeyStrip {
    pub fn new(x: f64, y: f64, width: f64, height: f64, keys: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            keys,
        }
    }

    pub fn key_width(&self) -> f64 {
        self.width / self.keys.max(1) as f64
    }
}

impl KeyboardGeometry for KeyStrip {
    fn key_count(&self) -> usize {
        self.keys
    }

    fn intersect(&self, point: &Pt2) -> Option<Pt2> {
        let local = Pt2::new(point.x - self.x, point.y - self.y);
        let inside = (0.0..self.width).contains(&local.x) && (0.0..self.height).contains(&local.y);
        inside.then_some(local)
    }

    fn key_index_at(&self, point: &Pt2) -> Option<usize> {
        let local = self.intersect(point)?;
        let key = (local.x / self.key_width()) as usize;
        (key < self.keys).then_some(key)
    }

    fn bottom_edge_y(&self) -> f64 {
        self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_split_the_strip_evenly() {
        let strip = KeyStrip::new(100.0, 300.0, 420.0, 80.0, 14);
        assert_eq!(strip.key_index_at(&Pt2::new(100.0, 310.0)), Some(0));
        assert_eq!(strip.key_index_at(&Pt2::new(131.0, 310.0)), Some(1));
        assert_eq!(strip.key_index_at(&Pt2::new(519.9, 379.0)), Some(13));
        assert_eq!(strip.bottom_edge_y(), 380.0);
    }

    #[test]
    fn points_off_the_strip_have_no_key() {
        let strip = KeyStrip::new(100.0, 300.0, 420.0, 80.0, 14);
        assert_eq!(strip.key_index_at(&Pt2::new(99.0, 310.0)), None);
        assert_eq!(strip.key_index_at(&Pt2::new(520.0, 310.0)), None);
        assert_eq!(strip.key_index_at(&Pt2::new(200.0, 380.0)), None);
        assert!(strip.intersect(&Pt2::new(200.0, 250.0)).is_none());
    }
}
