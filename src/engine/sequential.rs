use crate::engine::physics::{self, WaterColumn};
use crate::engine::{check_len, total_water, EngineKind, EngineParams, FlowEngine};
use crate::error::EngineError;
use crate::world::grid::OPPOSITE;
use crate::world::{Cell, Grid};

/// Reference single-threaded engine working directly on the cells
#[derive(Debug, Clone)]
pub struct SequentialFlowEngine {
    grid: Grid,
    params: EngineParams,
    water_sum: f64,
}

impl SequentialFlowEngine {
    pub fn new(grid: Grid, params: EngineParams) -> Self {
        Self {
            grid,
            params,
            water_sum: 0.0,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Outgoing pipe flux for every non-edge cell. Surface heights are frozen
    /// before the pass so every cell sees the same pre-step state.
    pub fn update_flux(&self, cells: &mut [Cell], dt: f32) {
        let params = EngineParams {
            time_step: dt,
            ..self.params
        };
        let surface: Vec<f32> = cells.iter().map(Cell::elevation).collect();

        for idx in 0..cells.len() {
            if cells[idx].is_edge {
                cells[idx].set_fluxes([0.0; 4]);
                continue;
            }
            let previous = cells[idx].fluxes();
            let mut next = [0.0; 4];
            for (dir, flux) in next.iter_mut().enumerate() {
                if let Some(neighbor) = self.grid.neighbor(idx, dir) {
                    *flux = physics::pipe_flux(previous[dir], surface[idx] - surface[neighbor], &params);
                }
            }
            cells[idx].set_fluxes(physics::clamp_outflow(next, cells[idx].water_depth));
        }
    }

    /// Apply the fluxes. Edge cells copy their inward neighbour's pre-step depth.
    pub fn update_water_depth(&self, cells: &mut [Cell], dt: f32) {
        let depth: Vec<f32> = cells.iter().map(|cell| cell.water_depth).collect();

        let mut next = Vec::with_capacity(cells.len());
        for (idx, cell) in cells.iter().enumerate() {
            if cell.is_edge {
                next.push(depth[self.grid.boundary_source(cell.x, cell.y)]);
                continue;
            }
            let inflow: f32 = (0..4)
                .filter_map(|dir| {
                    self.grid
                        .neighbor(idx, dir)
                        .map(|neighbor| cells[neighbor].fluxes()[OPPOSITE[dir]])
                })
                .sum();
            next.push(physics::settle_depth(depth[idx], inflow, cell.flux_out()));
        }

        for (cell, depth) in cells.iter_mut().zip(next) {
            cell.water_depth = depth;
            cell.velocity = physics::flow_velocity(cell.fluxes(), dt);
        }
    }

    /// Rising river stage
    pub fn add_water(&self, cells: &mut [Cell], dt: f32) {
        if self.params.water_saturation_increment > 0.0 {
            self.apply_river_stage(cells, dt);
        }
    }

    /// Receding river stage
    pub fn remove_water(&self, cells: &mut [Cell], dt: f32) {
        if self.params.water_saturation_increment < 0.0 {
            self.apply_river_stage(cells, dt);
        }
    }

    fn apply_river_stage(&self, cells: &mut [Cell], dt: f32) {
        let params = EngineParams {
            time_step: dt,
            ..self.params
        };
        for cell in cells.iter_mut().filter(|cell| !cell.is_edge) {
            let column = physics::apply_river_stage(
                WaterColumn {
                    depth: cell.water_depth,
                    saturation: cell.water_saturation,
                },
                cell.is_river,
                cell.initial_water_saturation,
                &params,
            );
            cell.water_depth = column.depth;
            cell.water_saturation = column.saturation;
        }
    }

    /// Infiltration loss for every non-edge cell
    pub fn infiltrate(&self, cells: &mut [Cell], dt: f32) {
        let params = EngineParams {
            time_step: dt,
            ..self.params
        };
        for cell in cells.iter_mut().filter(|cell| !cell.is_edge) {
            cell.water_depth = physics::infiltrate(cell.water_depth, cell.permeability, &params);
        }
    }

    /// Recompute the diagnostic water total
    pub fn mass_check(&mut self, cells: &[Cell]) -> f64 {
        self.water_sum = total_water(cells);
        self.water_sum
    }
}

impl FlowEngine for SequentialFlowEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sequential
    }

    fn is_ready(&mut self) -> bool {
        true
    }

    fn wait_until_ready(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn params(&self) -> &EngineParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut EngineParams {
        &mut self.params
    }

    fn update(&mut self, cells: &mut [Cell]) -> Result<(), EngineError> {
        check_len(&self.grid, cells)?;
        if self.grid.is_empty() {
            return Ok(());
        }
        let dt = self.params.time_step;
        self.update_flux(cells, dt);
        self.update_water_depth(cells, dt);
        self.add_water(cells, dt);
        self.remove_water(cells, dt);
        self.infiltrate(cells, dt);
        self.mass_check(cells);
        Ok(())
    }

    fn read_back(&mut self, _cells: &mut [Cell]) {}

    fn sync_from_cells(&mut self, cells: &[Cell]) {
        self.mass_check(cells);
    }

    fn water_sum(&self) -> f64 {
        self.water_sum
    }
}
