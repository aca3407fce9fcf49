//! Map bounds and heightmap.
//!
//! The map is `width` x `height` cells of size 1, with the origin at the
//! top-left corner. Heights are stored per cell corner, so there are
//! `(width + 1) * (height + 1)` of them; heights between corners are
//! bilinearly interpolated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BosonMap {
    /// Width of the map in cells.
    pub width: u32,
    /// Height of the map in cells.
    pub height: u32,
    /// Corner heights (row-major order).
    corners: Vec<f32>,
}

impl BosonMap {
    /// Flat map at height 0.
    pub fn new(width: u32, height: u32) -> Self {
        let corners = ((width as usize) + 1) * ((height as usize) + 1);
        Self {
            width,
            height,
            corners: vec![0.0; corners],
        }
    }

    fn corner_index(&self, x: u32, y: u32) -> Option<usize> {
        if x <= self.width && y <= self.height {
            Some(y as usize * (self.width as usize + 1) + x as usize)
        } else {
            None
        }
    }

    pub fn corner_height(&self, x: u32, y: u32) -> Option<f32> {
        self.corner_index(x, y).map(|i| self.corners[i])
    }

    /// Returns `false` if the corner is outside of the map.
    pub fn set_corner_height(&mut self, x: u32, y: u32, height: f32) -> bool {
        match self.corner_index(x, y) {
            Some(i) => {
                self.corners[i] = height;
                true
            }
            None => false,
        }
    }

    /// Whether the point lies on the map. The right and bottom edges are
    /// outside.
    pub fn on_map(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32
    }

    /// Whether an axis-aligned rectangle lies completely on the map.
    pub fn rect_on_map(&self, x: f32, y: f32, width: f32, height: f32) -> bool {
        x >= 0.0
            && y >= 0.0
            && x + width <= self.width as f32
            && y + height <= self.height as f32
    }

    /// Terrain height at a point (bilinear between the four cell corners).
    /// Points off the map are clamped to the border.
    pub fn height_at_point(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, self.width as f32);
        let y = y.clamp(0.0, self.height as f32);
        let cx = (x.floor() as u32).min(self.width.saturating_sub(1));
        let cy = (y.floor() as u32).min(self.height.saturating_sub(1));
        let fx = x - cx as f32;
        let fy = y - cy as f32;

        let h = |dx: u32, dy: u32| self.corner_height(cx + dx, cy + dy).unwrap_or(0.0);
        let top = h(0, 0) * (1.0 - fx) + h(1, 0) * fx;
        let bottom = h(0, 1) * (1.0 - fx) + h(1, 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}
