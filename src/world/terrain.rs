use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TerrainError;
use crate::world::banks::{mark_river_banks, partition_shores, RiverBankSegment};
use crate::world::cell::Cell;
use crate::world::grid::Grid;

/// Relative slack allowed between the width- and height-derived cell sizes
const CELL_ASPECT_TOLERANCE: f32 = 1e-3;

/// Raw numeric grids handed over by the data loader, all row-major and the same shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainData {
    pub width: usize,
    pub height: usize,
    /// Elevation in meters
    pub elevation: Vec<f32>,
    /// Non-zero marks a river cell
    pub river_mask: Option<Vec<f32>>,
    /// Initial surface water in meters
    pub water_depth: Option<Vec<f32>>,
    /// Index into the permeability zone table
    pub permeability_zones: Option<Vec<u8>>,
}

impl TerrainData {
    /// Flat terrain without river or water layers
    pub fn flat(width: usize, height: usize, elevation: f32) -> Self {
        Self {
            width,
            height,
            elevation: vec![elevation; width * height],
            river_mask: None,
            water_depth: None,
            permeability_zones: None,
        }
    }

    /// Generate a valley with a meandering river running top to bottom.
    /// Uses the seed for deterministic generation.
    pub fn synthetic_valley(width: usize, height: usize, seed: u64) -> Self {
        let mut local_rng = rand::rngs::StdRng::seed_from_u64(seed);
        let count = width * height;
        let mut elevation = Vec::with_capacity(count);
        let mut river_mask = Vec::with_capacity(count);
        let mut permeability_zones = Vec::with_capacity(count);

        let center = width as f32 / 2.0;
        let amplitude = width as f32 / 8.0;
        let half_width = (width as f32 / 30.0).max(0.5);

        for y in 0..height {
            let meander = (y as f32 / height.max(1) as f32 * std::f32::consts::TAU).sin() * amplitude;
            let river_x = center + meander;
            for x in 0..width {
                let dist = (x as f32 + 0.5 - river_x).abs();
                let is_river = dist <= half_width;
                let noise = local_rng.gen_range(0.0..0.3);
                // Valley walls rise away from the channel
                let height_m = if is_river {
                    1.0
                } else {
                    3.0 + dist * 0.35 + noise
                };
                elevation.push(height_m);
                river_mask.push(if is_river { 1.0 } else { 0.0 });
                permeability_zones.push(local_rng.gen_range(0..3));
            }
        }

        Self {
            width,
            height,
            elevation,
            river_mask: Some(river_mask),
            water_depth: None,
            permeability_zones: Some(permeability_zones),
        }
    }

    /// Fail fast on bad dimensions or mismatched layers
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.width == 0 || self.height == 0 {
            return Err(TerrainError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width * self.height;
        check_layer("elevation", expected, Some(self.elevation.len()))?;
        check_layer("river", expected, self.river_mask.as_ref().map(Vec::len))?;
        check_layer("water depth", expected, self.water_depth.as_ref().map(Vec::len))?;
        check_layer(
            "permeability",
            expected,
            self.permeability_zones.as_ref().map(Vec::len),
        )?;
        Ok(())
    }
}

fn check_layer(
    layer: &'static str,
    expected: usize,
    actual: Option<usize>,
) -> Result<(), TerrainError> {
    match actual {
        Some(actual) if actual != expected => Err(TerrainError::ShapeMismatch {
            layer,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Scalar preprocessing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSettings {
    /// Model width in meters, cell size = model width / grid width
    pub model_width: f32,
    /// Model height in meters. Cells are square, so when set it must match
    /// `model_width` scaled by the grid aspect ratio.
    pub model_height: Option<f32>,
    /// Open boundary at sea level along the border
    pub fill_terrain_edges: bool,
    /// Percentage of `heightmap_max_elevation` blended in along Y
    pub elevation_vertical_tilt: f32,
    pub heightmap_max_elevation: f32,
    /// Target bank segment length in cells (0 disables segmentation)
    pub river_bank_segment_length: usize,
    /// Infiltration rate per permeability zone
    pub permeability_zones: Vec<f32>,
    pub initial_water_saturation: f32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            model_width: 1.0,
            model_height: None,
            fill_terrain_edges: false,
            elevation_vertical_tilt: 0.0,
            heightmap_max_elevation: 0.0,
            river_bank_segment_length: 0,
            permeability_zones: vec![0.0],
            initial_water_saturation: 0.0,
        }
    }
}

/// Output of terrain preprocessing
#[derive(Debug, Clone)]
pub struct PreparedTerrain {
    pub grid: Grid,
    pub cells: Vec<Cell>,
    pub river_cells: Vec<usize>,
    pub edge_cells: Vec<usize>,
    pub shores: Vec<Option<u32>>,
    pub segments: Vec<RiverBankSegment>,
}

/// Turns raw loader grids into cells plus the derived bank-segment graph
pub struct TerrainPreprocessor {
    settings: TerrainSettings,
}

impl TerrainPreprocessor {
    pub fn new(settings: TerrainSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn prepare(&self, data: &TerrainData) -> Result<PreparedTerrain, TerrainError> {
        data.validate()?;
        let cell_size = self.settings.model_width / data.width as f32;
        if !(cell_size > 0.0) {
            return Err(TerrainError::NonPositiveCellSize(cell_size));
        }
        if let Some(model_height) = self.settings.model_height {
            let cell_height = model_height / data.height as f32;
            if !((cell_height - cell_size).abs() <= cell_size * CELL_ASPECT_TOLERANCE) {
                return Err(TerrainError::NonSquareCells {
                    width: cell_size,
                    height: cell_height,
                });
            }
        }

        let grid = Grid::new(data.width, data.height, cell_size);
        let mut cells = self.build_cells(&grid, data);

        let river_cells: Vec<usize> = cells
            .iter()
            .filter(|cell| cell.is_river)
            .map(|cell| cell.id)
            .collect();
        let edge_cells: Vec<usize> = cells
            .iter()
            .filter(|cell| cell.is_edge)
            .map(|cell| cell.id)
            .collect();

        let shores = partition_shores(&grid, &cells);
        let segments = mark_river_banks(
            &grid,
            &mut cells,
            &shores,
            self.settings.river_bank_segment_length,
        );

        info!(
            target: "levee_sandbox::terrain",
            width = grid.width,
            height = grid.height,
            cell_size = grid.cell_size,
            river_cells = river_cells.len(),
            edge_cells = edge_cells.len(),
            bank_segments = segments.len(),
            "terrain.prepared"
        );

        Ok(PreparedTerrain {
            grid,
            cells,
            river_cells,
            edge_cells,
            shores,
            segments,
        })
    }

    fn build_cells(&self, grid: &Grid, data: &TerrainData) -> Vec<Cell> {
        let settings = &self.settings;
        let tilt = settings.elevation_vertical_tilt / 100.0 * settings.heightmap_max_elevation;
        let last_row = grid.height.saturating_sub(1).max(1) as f32;

        let mut cells = Vec::with_capacity(grid.len());
        for y in 0..grid.height {
            // Top row gets the full offset, bottom row none
            let tilt_offset = tilt * (1.0 - y as f32 / last_row);
            for x in 0..grid.width {
                let idx = grid.index(x, y);
                let mut cell = Cell::new(x, y, grid.width);

                cell.is_river = data
                    .river_mask
                    .as_ref()
                    .is_some_and(|mask| mask[idx] > 0.0);
                cell.base_elevation = data.elevation[idx] + tilt_offset;

                if settings.fill_terrain_edges && grid.is_border(x, y) {
                    cell.is_edge = true;
                    cell.base_elevation = 0.0;
                }

                cell.permeability = if cell.is_river {
                    0.0
                } else {
                    let zone = data
                        .permeability_zones
                        .as_ref()
                        .map_or(0, |zones| zones[idx] as usize);
                    zone_permeability(&settings.permeability_zones, zone)
                };

                cell.initial_water_depth = data
                    .water_depth
                    .as_ref()
                    .map_or(0.0, |depth| depth[idx].max(0.0));
                cell.initial_water_saturation = settings.initial_water_saturation;
                cell.reset();
                cells.push(cell);
            }
        }
        cells
    }
}

/// Out-of-range zones use the last table entry
fn zone_permeability(table: &[f32], zone: usize) -> f32 {
    table
        .get(zone)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_zeroed_after_tilt() {
        let data = TerrainData::flat(4, 3, 5.0);
        let settings = TerrainSettings {
            model_width: 40.0,
            fill_terrain_edges: true,
            elevation_vertical_tilt: 50.0,
            heightmap_max_elevation: 10.0,
            ..Default::default()
        };
        let prepared = TerrainPreprocessor::new(settings).prepare(&data).unwrap();

        assert_eq!(prepared.grid.cell_size, 10.0);
        assert_eq!(prepared.edge_cells.len(), 10);
        let center = &prepared.cells[prepared.grid.index(1, 1)];
        assert!(!center.is_edge);
        // half of the 5 m tilt on the middle row
        assert!((center.base_elevation - 7.5).abs() < 1e-5);
        assert!(prepared
            .edge_cells
            .iter()
            .all(|&idx| prepared.cells[idx].base_elevation == 0.0));
    }

    #[test]
    fn mismatched_layers_fail_fast() {
        let mut data = TerrainData::flat(3, 3, 0.0);
        data.river_mask = Some(vec![0.0; 8]);
        let err = TerrainPreprocessor::new(TerrainSettings::default())
            .prepare(&data)
            .unwrap_err();
        assert_eq!(
            err,
            TerrainError::ShapeMismatch {
                layer: "river",
                expected: 9,
                actual: 8
            }
        );

        let empty = TerrainData::flat(0, 3, 0.0);
        assert!(matches!(
            empty.validate(),
            Err(TerrainError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn initial_water_and_permeability_are_applied() {
        let mut data = TerrainData::flat(2, 1, 1.0);
        data.water_depth = Some(vec![0.5, -1.0]);
        data.permeability_zones = Some(vec![1, 7]);
        let settings = TerrainSettings {
            model_width: 2.0,
            permeability_zones: vec![0.0, 0.01, 0.02],
            initial_water_saturation: 0.4,
            ..Default::default()
        };
        let prepared = TerrainPreprocessor::new(settings).prepare(&data).unwrap();

        assert_eq!(prepared.cells[0].water_depth, 0.5);
        assert_eq!(prepared.cells[1].water_depth, 0.0);
        assert_eq!(prepared.cells[0].permeability, 0.01);
        assert_eq!(prepared.cells[1].permeability, 0.02);
        assert_eq!(prepared.cells[1].water_saturation, 0.4);
    }

    #[test]
    fn synthetic_valley_is_deterministic() {
        let a = TerrainData::synthetic_valley(30, 30, 7);
        let b = TerrainData::synthetic_valley(30, 30, 7);
        assert_eq!(a, b);
        assert!(a.validate().is_ok());
        let rivers = a.river_mask.as_ref().unwrap().iter().filter(|v| **v > 0.0).count();
        assert!(rivers >= 30);
    }
}
