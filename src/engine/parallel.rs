use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Mutex;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::engine::physics::{self, WaterColumn};
use crate::engine::{check_len, EngineKind, EngineParams, FlowEngine};
use crate::error::EngineError;
use crate::world::grid::OPPOSITE;
use crate::world::{Cell, Grid};

// Static terrain channels
const RIVER: usize = 0;
const BASE_ELEVATION: usize = 1;
const INITIAL_SATURATION: usize = 2;
const PERMEABILITY: usize = 3;

// Evolving state channels
const DEPTH: usize = 0;
const SATURATION: usize = 1;

type PoolResult = Result<ThreadPool, ThreadPoolBuildError>;

/// Compute context life cycle. Building the worker pool happens off-thread;
/// the engine only accepts work once it is `Ready`.
enum ComputeContext {
    Pending(Mutex<Receiver<PoolResult>>),
    Ready(ThreadPool),
    Failed(String),
}

impl ComputeContext {
    fn spawn(workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("flow-compute-init".into())
            .spawn(move || {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("flow-compute-{i}"))
                    .build();
                // The engine may have been dropped before the pool finished
                let _ = sender.send(pool);
            });

        match spawned {
            Ok(_) => ComputeContext::Pending(Mutex::new(receiver)),
            Err(err) => ComputeContext::Failed(err.to_string()),
        }
    }

    fn resolve(&mut self, block: bool) {
        let ComputeContext::Pending(receiver) = self else {
            return;
        };
        let outcome = match receiver.get_mut() {
            Ok(receiver) if block => receiver.recv().map_err(|_| TryRecvError::Disconnected),
            Ok(receiver) => receiver.try_recv(),
            Err(_) => Err(TryRecvError::Disconnected),
        };
        *self = match outcome {
            Ok(Ok(pool)) => {
                info!(
                    target: "levee_sandbox::engine",
                    workers = pool.current_num_threads(),
                    "engine.parallel.ready"
                );
                ComputeContext::Ready(pool)
            }
            Ok(Err(err)) => ComputeContext::Failed(err.to_string()),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                ComputeContext::Failed("compute context initialisation aborted".into())
            }
        };
        if let ComputeContext::Failed(reason) = self {
            warn!(target: "levee_sandbox::engine", %reason, "engine.parallel.failed");
        }
    }
}

/// Data-parallel engine. Cells are packed into dense texture-like buffers
/// (one lane per cell) and each phase runs as a row-parallel pass.
pub struct ParallelFlowEngine {
    grid: Grid,
    params: EngineParams,
    context: ComputeContext,
    /// river flag, base elevation incl. levee, initial saturation, permeability
    terrain: Vec<[f32; 4]>,
    edge_mask: Vec<bool>,
    /// depth, saturation
    state: Vec<[f32; 2]>,
    state_back: Vec<[f32; 2]>,
    /// left, right, top, bottom
    flux: Vec<[f32; 4]>,
    water_sum: f64,
}

impl ParallelFlowEngine {
    /// `workers == 0` lets rayon pick the thread count
    pub fn new(grid: Grid, params: EngineParams, cells: &[Cell], workers: usize) -> Self {
        let mut engine = Self {
            grid,
            params,
            context: ComputeContext::spawn(workers),
            terrain: Vec::new(),
            edge_mask: Vec::new(),
            state: Vec::new(),
            state_back: Vec::new(),
            flux: Vec::new(),
            water_sum: 0.0,
        };
        engine.upload(cells);
        engine
    }

    fn upload(&mut self, cells: &[Cell]) {
        self.terrain = cells
            .iter()
            .map(|cell| {
                [
                    if cell.is_river { 1.0 } else { 0.0 },
                    cell.base_elevation + cell.levee_height,
                    cell.initial_water_saturation,
                    cell.permeability,
                ]
            })
            .collect();
        self.edge_mask = cells.iter().map(|cell| cell.is_edge).collect();
        self.state = cells
            .iter()
            .map(|cell| [cell.water_depth, cell.water_saturation])
            .collect();
        self.state_back = self.state.clone();
        self.flux = cells.iter().map(Cell::fluxes).collect();
        self.water_sum = self.sum_depth();
    }

    fn sum_depth(&self) -> f64 {
        self.state.iter().map(|lane| f64::from(lane[DEPTH])).sum()
    }

    fn flux_pass(&mut self) {
        let grid = self.grid;
        let params = self.params;
        let terrain = &self.terrain;
        let state = &self.state;
        let edge_mask = &self.edge_mask;
        let surface = |idx: usize| terrain[idx][BASE_ELEVATION] + state[idx][DEPTH];

        self.flux
            .par_chunks_mut(grid.width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, lane) in row.iter_mut().enumerate() {
                    let idx = grid.index(x, y);
                    if edge_mask[idx] {
                        *lane = [0.0; 4];
                        continue;
                    }
                    let here = surface(idx);
                    let mut next = [0.0; 4];
                    for (dir, flux) in next.iter_mut().enumerate() {
                        if let Some(neighbor) = grid.neighbor(idx, dir) {
                            *flux = physics::pipe_flux(lane[dir], here - surface(neighbor), &params);
                        }
                    }
                    *lane = physics::clamp_outflow(next, state[idx][DEPTH]);
                }
            });
    }

    fn water_pass(&mut self) {
        let grid = self.grid;
        let params = self.params;
        let terrain = &self.terrain;
        let state = &self.state;
        let flux = &self.flux;
        let edge_mask = &self.edge_mask;

        self.state_back
            .par_chunks_mut(grid.width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, lane) in row.iter_mut().enumerate() {
                    let idx = grid.index(x, y);
                    if edge_mask[idx] {
                        let source = grid.boundary_source(x, y);
                        *lane = [state[source][DEPTH], state[idx][SATURATION]];
                        continue;
                    }
                    let inflow: f32 = (0..4)
                        .filter_map(|dir| {
                            grid.neighbor(idx, dir)
                                .map(|neighbor| flux[neighbor][OPPOSITE[dir]])
                        })
                        .sum();
                    let outflow: f32 = flux[idx].iter().sum();
                    let column = physics::apply_river_stage(
                        WaterColumn {
                            depth: physics::settle_depth(state[idx][DEPTH], inflow, outflow),
                            saturation: state[idx][SATURATION],
                        },
                        terrain[idx][RIVER] > 0.5,
                        terrain[idx][INITIAL_SATURATION],
                        &params,
                    );
                    let depth = physics::infiltrate(column.depth, terrain[idx][PERMEABILITY], &params);
                    *lane = [depth, column.saturation];
                }
            });

        std::mem::swap(&mut self.state, &mut self.state_back);
    }
}

impl FlowEngine for ParallelFlowEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Parallel
    }

    fn is_ready(&mut self) -> bool {
        self.context.resolve(false);
        matches!(self.context, ComputeContext::Ready(_))
    }

    fn wait_until_ready(&mut self) -> Result<(), EngineError> {
        self.context.resolve(true);
        match &self.context {
            ComputeContext::Ready(_) => Ok(()),
            ComputeContext::Failed(reason) => Err(EngineError::ContextUnavailable(reason.clone())),
            ComputeContext::Pending(_) => Err(EngineError::NotReady),
        }
    }

    fn params(&self) -> &EngineParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut EngineParams {
        &mut self.params
    }

    fn update(&mut self, cells: &mut [Cell]) -> Result<(), EngineError> {
        check_len(&self.grid, cells)?;
        self.context.resolve(false);
        // Temporarily take the pool so the passes can borrow the buffers mutably
        let pool = match std::mem::replace(&mut self.context, ComputeContext::Failed(String::new())) {
            ComputeContext::Ready(pool) => pool,
            ComputeContext::Failed(reason) => {
                self.context = ComputeContext::Failed(reason.clone());
                return Err(EngineError::ContextUnavailable(reason));
            }
            pending @ ComputeContext::Pending(_) => {
                self.context = pending;
                return Err(EngineError::NotReady);
            }
        };

        // row passes chunk by width, which must be non-zero
        if !self.grid.is_empty() {
            pool.install(|| {
                self.flux_pass();
                self.water_pass();
            });
        }
        self.context = ComputeContext::Ready(pool);
        self.water_sum = self.sum_depth();
        Ok(())
    }

    fn read_back(&mut self, cells: &mut [Cell]) {
        let dt = self.params.time_step;
        for ((cell, state), flux) in cells.iter_mut().zip(&self.state).zip(&self.flux) {
            cell.water_depth = state[DEPTH];
            cell.water_saturation = state[SATURATION];
            cell.set_fluxes(*flux);
            cell.velocity = physics::flow_velocity(*flux, dt);
        }
    }

    fn sync_from_cells(&mut self, cells: &[Cell]) {
        self.upload(cells);
    }

    fn water_sum(&self) -> f64 {
        self.water_sum
    }
}
