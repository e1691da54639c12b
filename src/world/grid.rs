use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Direction offsets in `[left, right, top, bottom]` order, matching the flux channels
pub const DIRECTIONS_4: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Orthogonal neighbours first so bank chains prefer straight steps
pub const DIRECTIONS_8: [(isize, isize); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// Index of the flux channel pointing back at the sender
pub const OPPOSITE: [usize; 4] = [1, 0, 3, 2];

/// Dimensions of the terrain grid plus coordinate helpers.
/// All lookups are total: anything outside `[0, width) x [0, height)` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    /// Cell edge length in meters
    pub cell_size: f32,
}

impl Grid {
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        Self {
            width,
            height,
            cell_size,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        index(x, y, self.width)
    }

    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    /// Index for signed coordinates, `None` when out of bounds
    pub fn checked_index(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then(|| self.index(x, y))
    }

    /// Neighbour in one of the four flux directions
    pub fn neighbor(&self, idx: usize, dir: usize) -> Option<usize> {
        let (x, y) = self.coords(idx);
        let (dx, dy) = DIRECTIONS_4[dir];
        self.checked_index(x as isize + dx, y as isize + dy)
    }

    pub fn neighbors4(&self, idx: usize) -> SmallVec<[usize; 4]> {
        let (x, y) = self.coords(idx);
        DIRECTIONS_4
            .iter()
            .filter_map(|&(dx, dy)| self.checked_index(x as isize + dx, y as isize + dy))
            .collect()
    }

    pub fn neighbors8(&self, idx: usize) -> SmallVec<[usize; 8]> {
        let (x, y) = self.coords(idx);
        DIRECTIONS_8
            .iter()
            .filter_map(|&(dx, dy)| self.checked_index(x as isize + dx, y as isize + dy))
            .collect()
    }

    pub fn is_border(&self, x: usize, y: usize) -> bool {
        x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height
    }

    /// Interior cell an edge cell mirrors. `x` is checked before `y`, so corners
    /// pull horizontally.
    pub fn boundary_source(&self, x: usize, y: usize) -> usize {
        let last_x = self.width.saturating_sub(1);
        let last_y = self.height.saturating_sub(1);
        let (sx, sy) = if x == 0 {
            ((x + 1).min(last_x), y)
        } else if x == last_x {
            (x.saturating_sub(1), y)
        } else if y == 0 {
            (x, (y + 1).min(last_y))
        } else if y == last_y {
            (x, y.saturating_sub(1))
        } else {
            (x, y)
        };
        self.index(sx, sy)
    }

    /// Cell containing a point given in model meters
    pub fn index_at_point(&self, point: Vec2) -> Option<usize> {
        if !point.x.is_finite() || !point.y.is_finite() || self.cell_size <= 0.0 {
            return None;
        }
        let cell = (point / self.cell_size).floor();
        self.checked_index(cell.x as isize, cell.y as isize)
    }

    pub fn cell_area(&self) -> f32 {
        self.cell_size * self.cell_size
    }
}

/// Linear index of a grid coordinate
#[inline]
pub fn index(x: usize, y: usize, width: usize) -> usize {
    x + y * width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_exclude_out_of_bounds() {
        let grid = Grid::new(3, 3, 1.0);
        let corner = grid.neighbors4(0);
        assert_eq!(corner.as_slice(), &[1, 3]);
        assert_eq!(grid.neighbors8(0).len(), 3);
        assert_eq!(grid.neighbors8(4).len(), 8);
        assert_eq!(grid.neighbors4(4).as_slice(), &[3, 5, 1, 7]);
    }

    #[test]
    fn out_of_range_lookups_are_absent() {
        let grid = Grid::new(4, 2, 10.0);
        assert_eq!(grid.checked_index(-1, 0), None);
        assert_eq!(grid.checked_index(4, 0), None);
        assert_eq!(grid.checked_index(3, 1), Some(7));
        assert_eq!(grid.index_at_point(Vec2::new(39.9, 19.9)), Some(7));
        assert_eq!(grid.index_at_point(Vec2::new(40.0, 5.0)), None);
        assert_eq!(grid.index_at_point(Vec2::new(-0.1, 5.0)), None);
        assert_eq!(grid.index_at_point(Vec2::new(f32::NAN, 5.0)), None);
    }

    #[test]
    fn boundary_source_checks_x_first() {
        let grid = Grid::new(4, 4, 1.0);
        assert_eq!(grid.boundary_source(0, 0), grid.index(1, 0));
        assert_eq!(grid.boundary_source(3, 3), grid.index(2, 3));
        assert_eq!(grid.boundary_source(2, 0), grid.index(2, 1));
        assert_eq!(grid.boundary_source(1, 3), grid.index(1, 2));
    }

    #[test]
    fn degenerate_grid_mirrors_itself() {
        let grid = Grid::new(1, 1, 1.0);
        assert_eq!(grid.boundary_source(0, 0), 0);
        assert!(grid.neighbors8(0).is_empty());
    }
}
