use serde::{Deserialize, Serialize};

/// Represents a single location in the terrain grid
/// Each cell carries static terrain data plus the water state mutated every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Grid column
    pub x: usize,
    /// Grid row (0 = top)
    pub y: usize,
    /// Linear index, `x + y * width`
    pub id: usize,

    /// Ground elevation in meters
    pub base_elevation: f32,
    /// Infiltration rate (m/hour) before the flood multiplier
    pub permeability: f32,
    pub is_river: bool,
    /// Boundary cell (only when terrain edges are filled)
    pub is_edge: bool,
    /// Land cell touching the river
    pub is_river_bank: bool,
    /// Bank segment that first claimed this cell
    pub river_bank_segment_idx: Option<usize>,
    /// Levee height in meters (0.0 = no levee)
    pub levee_height: f32,
    /// Surface water present when the terrain was loaded
    pub initial_water_depth: f32,
    /// Saturation baseline restored on reset
    pub initial_water_saturation: f32,

    /// Surface water in meters, never negative
    pub water_depth: f32,
    /// Soil saturation / normalized river stage
    pub water_saturation: f32,
    pub flux_l: f32,
    pub flux_r: f32,
    pub flux_t: f32,
    pub flux_b: f32,
    /// Magnitude of the net outgoing flow (m/hour)
    pub velocity: f32,
}

impl Cell {
    /// Create a dry cell at the given grid position
    pub fn new(x: usize, y: usize, width: usize) -> Self {
        Self {
            x,
            y,
            id: x + y * width,
            base_elevation: 0.0,
            permeability: 0.0,
            is_river: false,
            is_edge: false,
            is_river_bank: false,
            river_bank_segment_idx: None,
            levee_height: 0.0,
            initial_water_depth: 0.0,
            initial_water_saturation: 0.0,
            water_depth: 0.0,
            water_saturation: 0.0,
            flux_l: 0.0,
            flux_r: 0.0,
            flux_t: 0.0,
            flux_b: 0.0,
            velocity: 0.0,
        }
    }

    /// Total water leaving the cell this step
    pub fn flux_out(&self) -> f32 {
        self.flux_l + self.flux_r + self.flux_t + self.flux_b
    }

    /// Water surface height used for flow comparisons (levees raise it without storing water)
    pub fn elevation(&self) -> f32 {
        self.base_elevation + self.water_depth + self.levee_height
    }

    pub fn is_levee(&self) -> bool {
        self.levee_height > 0.0
    }

    /// Outgoing fluxes in `[left, right, top, bottom]` order
    pub fn fluxes(&self) -> [f32; 4] {
        [self.flux_l, self.flux_r, self.flux_t, self.flux_b]
    }

    pub fn set_fluxes(&mut self, fluxes: [f32; 4]) {
        [self.flux_l, self.flux_r, self.flux_t, self.flux_b] = fluxes;
    }

    /// Restore the dynamic state to its load-time baseline.
    /// Terrain attributes and levees are kept.
    pub fn reset(&mut self) {
        self.water_depth = self.initial_water_depth;
        self.water_saturation = self.initial_water_saturation;
        self.set_fluxes([0.0; 4]);
        self.velocity = 0.0;
    }

    /// Levees only go away on a full reload
    pub fn clear_levee(&mut self) {
        self.levee_height = 0.0;
    }

    pub fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            water_depth: self.water_depth,
            water_saturation: self.water_saturation,
            flux_l: self.flux_l,
            flux_r: self.flux_r,
            flux_t: self.flux_t,
            flux_b: self.flux_b,
            velocity: self.velocity,
        }
    }

    pub fn restore(&mut self, snapshot: &CellSnapshot) {
        self.water_depth = snapshot.water_depth;
        self.water_saturation = snapshot.water_saturation;
        self.flux_l = snapshot.flux_l;
        self.flux_r = snapshot.flux_r;
        self.flux_t = snapshot.flux_t;
        self.flux_b = snapshot.flux_b;
        self.velocity = snapshot.velocity;
    }
}

/// Every dynamic attribute that influences future ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub water_depth: f32,
    pub water_saturation: f32,
    pub flux_l: f32,
    pub flux_r: f32,
    pub flux_t: f32,
    pub flux_b: f32,
    pub velocity: f32,
}
