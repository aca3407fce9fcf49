//! Cell occupancy index for collision, placement and range queries.
//!
//! Every item is entered into each cell its bounding rectangle overlaps, so
//! occupancy questions ("is anything standing on these cells?") are O(cells)
//! and range queries only look at the cells covering the query area. The grid
//! holds ids only; the canvas keeps it in sync from its create, move and
//! delete paths.
//!
//! ## Determinism
//!
//! Cells are hashed, so every query collects into an ordered set before
//! returning. Results are always sorted by item id.

use crate::components::{ItemId, ItemSize, Position, Vec3};
use std::collections::{BTreeSet, HashMap};

/// Axis-aligned rectangle on the map plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn of_item(pos: &Position, size: &ItemSize) -> Self {
        Self::new(pos.x, pos.y, size.width, size.height)
    }

    /// Strict overlap: rectangles that merely share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Entry in the grid.
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub id: ItemId,
    pub rect: Rect,
    pub z: f32,
    pub depth: f32,
    pub is_unit: bool,
    /// Destroyed units (wrecks) still occupy cells but are not valid targets.
    pub destroyed: bool,
}

impl SpatialEntry {
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.rect.x + self.rect.width / 2.0,
            self.rect.y + self.rect.height / 2.0,
            self.z,
        )
    }

    /// Center distance shrunk by half the smaller footprint side. This is
    /// the distance explosions use for their falloff.
    pub fn corrected_distance(&self, point: Vec3) -> f32 {
        let d = self.center().distance_to(&point) - self.rect.width.min(self.rect.height) / 2.0;
        d.max(0.0)
    }
}

#[derive(Debug)]
pub struct SpatialGrid {
    /// Cell size in map units (Boson cells are 1x1).
    pub cell_size: f32,
    cells: HashMap<(i32, i32), Vec<ItemId>>,
    entries: HashMap<ItemId, SpatialEntry>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Inclusive cell range covered by `rect`. A rectangle ending exactly on
    /// a cell border does not cover the next cell.
    fn cell_range(&self, rect: &Rect) -> ((i32, i32), (i32, i32)) {
        let min = self.world_to_cell(rect.x, rect.y);
        let max_x = rect.x + rect.width.max(0.0);
        let max_y = rect.y + rect.height.max(0.0);
        let mut max = self.world_to_cell(max_x, max_y);
        if rect.width > 0.0 && (max_x / self.cell_size).fract() == 0.0 {
            max.0 -= 1;
        }
        if rect.height > 0.0 && (max_y / self.cell_size).fract() == 0.0 {
            max.1 -= 1;
        }
        (min, (max.0.max(min.0), max.1.max(min.1)))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
    }

    /// Insert or move an item.
    pub fn insert(&mut self, entry: SpatialEntry) {
        self.remove(entry.id);
        let ((x0, y0), (x1, y1)) = self.cell_range(&entry.rect);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.cells.entry((cx, cy)).or_default().push(entry.id);
            }
        }
        self.entries.insert(entry.id, entry);
    }

    pub fn remove(&mut self, id: ItemId) -> Option<SpatialEntry> {
        let entry = self.entries.remove(&id)?;
        let ((x0, y0), (x1, y1)) = self.cell_range(&entry.rect);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if let Some(ids) = self.cells.get_mut(&(cx, cy)) {
                    ids.retain(|i| *i != id);
                    if ids.is_empty() {
                        self.cells.remove(&(cx, cy));
                    }
                }
            }
        }
        Some(entry)
    }

    /// Flag a unit as a wreck without moving it.
    pub fn mark_destroyed(&mut self, id: ItemId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.destroyed = true;
        }
    }

    pub fn entry(&self, id: ItemId) -> Option<&SpatialEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids stored in the cells covered by `rect`, deduplicated.
    fn candidates(&self, rect: &Rect) -> BTreeSet<ItemId> {
        let ((x0, y0), (x1, y1)) = self.cell_range(rect);
        let mut out = BTreeSet::new();
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if let Some(ids) = self.cells.get(&(cx, cy)) {
                    out.extend(ids.iter().copied());
                }
            }
        }
        out
    }

    fn sphere_bounds(point: Vec3, radius: f32) -> Rect {
        Rect::new(point.x - radius, point.y - radius, radius * 2.0, radius * 2.0)
    }

    /// Whether any unit (including wrecks) stands on a cell covered by `rect`.
    pub fn cells_occupied(&self, rect: &Rect) -> bool {
        self.candidates(rect)
            .iter()
            .filter_map(|id| self.entries.get(id))
            .any(|e| e.is_unit)
    }

    /// Living units whose center lies within `radius` of `point` on the map
    /// plane.
    pub fn units_in_range(&self, point: Vec3, radius: f32) -> Vec<ItemId> {
        let r_sq = radius * radius;
        self.candidates(&Self::sphere_bounds(point, radius))
            .into_iter()
            .filter(|id| {
                self.entries.get(id).is_some_and(|e| {
                    let c = e.center();
                    let (dx, dy) = (c.x - point.x, c.y - point.y);
                    e.is_unit && !e.destroyed && dx * dx + dy * dy <= r_sq
                })
            })
            .collect()
    }

    /// Units (wrecks included) touched by a sphere, using the same corrected
    /// distance as the explosion falloff.
    pub fn unit_collisions_in_sphere(&self, point: Vec3, radius: f32) -> Vec<ItemId> {
        let bounds = Self::sphere_bounds(point, radius + 1.0);
        self.candidates(&bounds)
            .into_iter()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|e| e.is_unit && e.corrected_distance(point) <= radius)
            })
            .collect()
    }

    /// Items colliding with `rect`, except `exclude`. With `exact` the
    /// bounding rectangles must overlap; otherwise sharing a cell is enough.
    pub fn collisions(&self, rect: &Rect, exclude: Option<ItemId>, exact: bool) -> Vec<ItemId> {
        self.candidates(rect)
            .into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter(|id| {
                !exact
                    || self
                        .entries
                        .get(id)
                        .is_some_and(|e| e.rect.intersects(rect))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u32, x: f32, y: f32) -> SpatialEntry {
        SpatialEntry {
            id: ItemId(id),
            rect: Rect::new(x, y, 1.0, 1.0),
            z: 0.0,
            depth: 1.0,
            is_unit: true,
            destroyed: false,
        }
    }

    #[test]
    fn test_spatial_grid_insert_query() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(unit(1, 5.0, 5.0));
        grid.insert(unit(2, 15.0, 5.0));
        grid.insert(unit(3, 100.0, 100.0));

        let center = Vec3::new(5.5, 5.5, 0.0);
        assert_eq!(grid.units_in_range(center, 11.0), vec![ItemId(1), ItemId(2)]);
        assert_eq!(grid.units_in_range(center, 5.0), vec![ItemId(1)]);
        assert_eq!(
            grid.units_in_range(Vec3::new(100.5, 100.5, 0.0), 1.0),
            vec![ItemId(3)]
        );
    }

    #[test]
    fn test_insert_moves_entry() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(unit(1, 0.0, 0.0));
        grid.insert(unit(1, 10.0, 10.0));

        assert!(!grid.cells_occupied(&Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert!(grid.cells_occupied(&Rect::new(10.0, 10.0, 1.0, 1.0)));
        assert_eq!(grid.len(), 1);

        grid.remove(ItemId(1));
        assert!(grid.is_empty());
        assert!(!grid.cells_occupied(&Rect::new(10.0, 10.0, 1.0, 1.0)));
    }

    #[test]
    fn test_cell_range_excludes_touching_edge() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(unit(1, 2.0, 2.0));
        // Rect [1,2) x [1,2) only touches the unit's corner.
        assert!(!grid.cells_occupied(&Rect::new(1.0, 1.0, 1.0, 1.0)));
        assert!(grid.cells_occupied(&Rect::new(1.5, 1.5, 1.0, 1.0)));
    }

    #[test]
    fn test_destroyed_units_are_not_in_range() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(unit(1, 0.0, 0.0));
        grid.mark_destroyed(ItemId(1));

        assert!(grid.units_in_range(Vec3::new(0.5, 0.5, 0.0), 2.0).is_empty());
        assert_eq!(
            grid.unit_collisions_in_sphere(Vec3::new(0.5, 0.5, 0.0), 2.0),
            vec![ItemId(1)]
        );
        assert!(grid.cells_occupied(&Rect::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_collisions_exact_and_exclude() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(unit(1, 0.0, 0.0));
        let mut shot = unit(2, 0.6, 0.6);
        shot.rect = Rect::new(0.6, 0.6, 0.3, 0.3);
        shot.is_unit = false;
        grid.insert(shot);

        let probe = Rect::new(0.6, 0.6, 0.3, 0.3);
        assert_eq!(grid.collisions(&probe, Some(ItemId(2)), true), vec![ItemId(1)]);
        assert_eq!(grid.collisions(&probe, None, true), vec![ItemId(1), ItemId(2)]);

        // Same cell, but no overlap.
        let corner = Rect::new(0.0, 0.0, 0.1, 0.1);
        assert_eq!(grid.collisions(&corner, Some(ItemId(1)), true), Vec::<ItemId>::new());
        assert_eq!(grid.collisions(&corner, Some(ItemId(1)), false), vec![ItemId(2)]);
    }

    #[test]
    fn test_sphere_uses_corrected_distance() {
        let mut grid = SpatialGrid::new(1.0);
        let mut big = unit(1, 0.0, 0.0);
        big.rect = Rect::new(0.0, 0.0, 4.0, 4.0);
        grid.insert(big);

        // Center (2,2), distance to (6,2) is 4, corrected 4 - 2 = 2.
        let point = Vec3::new(6.0, 2.0, 0.0);
        assert_eq!(grid.unit_collisions_in_sphere(point, 2.0), vec![ItemId(1)]);
        assert!(grid.unit_collisions_in_sphere(point, 1.9).is_empty());
    }
}
