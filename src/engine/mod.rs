//! Flow engines: one physics contract, two execution backends.

mod parallel;
pub mod physics;
mod sequential;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::world::{Cell, Grid};

pub use parallel::ParallelFlowEngine;
pub use sequential::SequentialFlowEngine;

/// Which backend runs the physics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Sequential,
    Parallel,
}

/// Scalar parameters shared by both engines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    /// Cell edge length in meters
    pub cell_size: f32,
    /// Fraction of last step's flux carried over, in (0, 1); higher = less damping
    pub damping_factor: f32,
    /// Physics step in hours
    pub time_step: f32,
    /// Flux per hour per meter of head difference
    pub pipe_conductance: f32,
    pub flood_permeability_mult: f32,
    /// Signed river-stage forcing rate, set by the driver every tick
    pub water_saturation_increment: f32,
    pub river_stage_increase_speed: f32,
    /// Meters of surface water per unit of river stage above bank-full
    pub river_channel_depth: f32,
    /// Land saturation may rise this far above its baseline (capped at 1)
    pub land_saturation_headroom: f32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            damping_factor: 0.97,
            time_step: 0.1,
            pipe_conductance: 1.0,
            flood_permeability_mult: 1.0,
            water_saturation_increment: 0.0,
            river_stage_increase_speed: 1.0,
            river_channel_depth: 2.0,
            land_saturation_headroom: 0.2,
        }
    }
}

/// Backend-agnostic physics step over the cell array.
///
/// The cell slice stays the source of truth between runs: `update` advances
/// the physics, `read_back` makes the result visible in the cells, and
/// `sync_from_cells` pushes external edits (levees, snapshot restores) into
/// the engine.
pub trait FlowEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Non-blocking readiness check
    fn is_ready(&mut self) -> bool;

    /// Block until the compute context is usable
    fn wait_until_ready(&mut self) -> Result<(), EngineError>;

    fn params(&self) -> &EngineParams;

    fn params_mut(&mut self) -> &mut EngineParams;

    fn set_water_saturation_increment(&mut self, increment: f32) {
        self.params_mut().water_saturation_increment = increment;
    }

    /// One physics step: flux, depth, forcing, infiltration
    fn update(&mut self, cells: &mut [Cell]) -> Result<(), EngineError>;

    /// Copy the engine's water output into the cells
    fn read_back(&mut self, cells: &mut [Cell]);

    fn sync_from_cells(&mut self, cells: &[Cell]);

    /// Total surface water after the last update
    fn water_sum(&self) -> f64;
}

/// Build the engine for `kind`. Parallel engines start their compute context
/// in the background; check `is_ready` before calling `update`.
pub fn create_engine(
    kind: EngineKind,
    grid: Grid,
    params: EngineParams,
    cells: &[Cell],
    workers: usize,
) -> Box<dyn FlowEngine> {
    info!(
        target: "levee_sandbox::engine",
        ?kind,
        cells = cells.len(),
        time_step = params.time_step,
        damping = params.damping_factor,
        "engine.created"
    );
    match kind {
        EngineKind::Sequential => Box::new(SequentialFlowEngine::new(grid, params)),
        EngineKind::Parallel => Box::new(ParallelFlowEngine::new(grid, params, cells, workers)),
    }
}

/// Total surface water of a cell array
pub fn total_water(cells: &[Cell]) -> f64 {
    cells.iter().map(|cell| f64::from(cell.water_depth)).sum()
}

fn check_len(grid: &Grid, cells: &[Cell]) -> Result<(), EngineError> {
    if cells.len() != grid.len() {
        return Err(EngineError::GridMismatch {
            expected: grid.len(),
            actual: cells.len(),
        });
    }
    Ok(())
}
