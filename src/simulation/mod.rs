//! Simulation driver: owns simulated time, forcing parameters, levees and
//! the active flow engine.
//!
//! The driver does not schedule itself. A host (see `crate::schedule`) calls
//! [`Simulation::advance_frame`] once per frame, which runs `speed_mult` ticks
//! while the simulation is running.

pub mod config;
pub mod events;
pub mod snapshots;

use glam::Vec2;
use tracing::{debug, info, warn};

pub use config::{RainForcing, RainIntensity, SimulationConfig};
pub use events::{EventBus, ListenerId, SimulationEvent, SimulationEventKind};
pub use snapshots::{SimulationSnapshot, SnapshotManager};

use crate::engine::{create_engine, EngineKind, FlowEngine};
use crate::error::SimulationError;
use crate::world::{Cell, Grid, PreparedTerrain, RiverBankSegment, TerrainData, TerrainPreprocessor};

pub const HOURS_PER_DAY: f32 = 24.0;

/// Absorbs f32 rounding when turning a tick count into whole hours
const HOUR_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Unloaded,
    /// Terrain is prepared but the engine's compute context is not ready yet
    Loading,
    Ready(RunState),
}

struct LoadedWorld {
    terrain: PreparedTerrain,
    engine: Box<dyn FlowEngine>,
}

pub struct Simulation {
    /// Values `reload` returns to
    preset: SimulationConfig,
    /// Active values, including user adjustments
    config: SimulationConfig,
    state: SimulationState,
    terrain_data: Option<TerrainData>,
    world: Option<LoadedWorld>,
    ticks: u64,
    last_hour: Option<u64>,
    /// Set by a rewind; the next step drops the snapshots ahead of it
    rewound: bool,
    levee_count: usize,
    snapshots: SnapshotManager,
    events: EventBus,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            snapshots: SnapshotManager::new(config.snapshot_interval_hours),
            preset: config.clone(),
            config,
            state: SimulationState::Unloaded,
            terrain_data: None,
            world: None,
            ticks: 0,
            last_hour: None,
            rewound: false,
            levee_count: 0,
            events: EventBus::new(),
        }
    }

    /// Preprocess the terrain and build the configured engine.
    /// On failure the driver is left unloaded.
    pub fn load(&mut self, terrain: TerrainData) -> Result<(), SimulationError> {
        self.state = SimulationState::Loading;
        self.world = None;

        let world = match self.build_world(&terrain) {
            Ok(world) => world,
            Err(err) => {
                self.state = SimulationState::Unloaded;
                warn!(target: "levee_sandbox::simulation", error = %err, "simulation.load_failed");
                return Err(err);
            }
        };

        info!(
            target: "levee_sandbox::simulation",
            width = world.terrain.grid.width,
            height = world.terrain.grid.height,
            segments = world.terrain.segments.len(),
            engine = ?world.engine.kind(),
            "simulation.loaded"
        );
        self.world = Some(world);
        self.terrain_data = Some(terrain);
        self.levee_count = 0;
        self.reset_timeline();
        self.poll_ready();
        Ok(())
    }

    fn build_world(&self, terrain: &TerrainData) -> Result<LoadedWorld, SimulationError> {
        self.config.validate()?;
        let mut terrain = TerrainPreprocessor::new(self.config.terrain_settings()).prepare(terrain)?;
        terrain.cells.iter_mut().for_each(Cell::reset);
        let engine = build_engine(&self.config, &terrain);
        Ok(LoadedWorld { terrain, engine })
    }

    /// Move from `Loading` to `Ready` once the engine accepts work
    pub fn poll_ready(&mut self) -> bool {
        if self.state == SimulationState::Loading {
            if let Some(world) = self.world.as_mut() {
                if world.engine.is_ready() {
                    self.state = SimulationState::Ready(RunState::Idle);
                    info!(
                        target: "levee_sandbox::simulation",
                        engine = ?world.engine.kind(),
                        "simulation.ready"
                    );
                }
            }
        }
        matches!(self.state, SimulationState::Ready(_))
    }

    /// Block until the engine's compute context is usable
    pub fn wait_until_ready(&mut self) -> Result<(), SimulationError> {
        let world = self.world.as_mut().ok_or(SimulationError::NotLoaded)?;
        world.engine.wait_until_ready()?;
        self.poll_ready();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SimulationError> {
        if self.world.is_none() {
            return Err(SimulationError::NotLoaded);
        }
        if !self.poll_ready() {
            return Err(SimulationError::NotReady);
        }
        if self.is_running() {
            return Ok(());
        }

        let time = self.time_in_hours();
        self.snapshots.on_start(time);
        self.rewound = false;
        self.state = SimulationState::Ready(RunState::Running);
        self.events.emit(SimulationEvent::Start);
        info!(target: "levee_sandbox::simulation", time_hours = time, "simulation.started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.is_running() {
            self.state = SimulationState::Ready(RunState::Idle);
            info!(
                target: "levee_sandbox::simulation",
                time_hours = self.time_in_hours(),
                "simulation.stopped"
            );
        }
    }

    /// Back to time zero with the current user parameters and levees.
    /// The engine is rebuilt, so an engine kind change takes effect here.
    pub fn restart(&mut self) -> Result<(), SimulationError> {
        let world = self.world.as_mut().ok_or(SimulationError::NotLoaded)?;
        world.terrain.cells.iter_mut().for_each(Cell::reset);
        world.engine = build_engine(&self.config, &world.terrain);

        self.state = SimulationState::Loading;
        self.events.emit(SimulationEvent::Restart);
        self.reset_timeline();
        self.poll_ready();
        info!(target: "levee_sandbox::simulation", "simulation.restarted");
        Ok(())
    }

    /// Restart with the preset's parameters and no levees
    pub fn reload(&mut self) -> Result<(), SimulationError> {
        self.reload_with(self.preset.clone())
    }

    /// Reload with a new preset. Terrain is preprocessed again only when the
    /// terrain settings changed.
    pub fn reload_with(&mut self, config: SimulationConfig) -> Result<(), SimulationError> {
        config.validate()?;
        if self.world.is_none() {
            return Err(SimulationError::NotLoaded);
        }

        let rebuild_terrain = config.terrain_settings() != self.preset.terrain_settings();
        self.snapshots = SnapshotManager::new(config.snapshot_interval_hours);
        self.preset = config.clone();
        self.config = config;

        if rebuild_terrain {
            let terrain = self.terrain_data.take().ok_or(SimulationError::NotLoaded)?;
            info!(target: "levee_sandbox::simulation", "simulation.reload.terrain");
            self.events.emit(SimulationEvent::Restart);
            return self.load(terrain);
        }

        let world = self.world.as_mut().ok_or(SimulationError::NotLoaded)?;
        for cell in world.terrain.cells.iter_mut() {
            cell.clear_levee();
            cell.initial_water_saturation = self.config.initial_water_saturation;
            cell.reset();
        }
        world.engine = build_engine(&self.config, &world.terrain);
        self.levee_count = 0;

        self.state = SimulationState::Loading;
        self.events.emit(SimulationEvent::Restart);
        self.reset_timeline();
        self.poll_ready();
        info!(target: "levee_sandbox::simulation", "simulation.reloaded");
        Ok(())
    }

    fn reset_timeline(&mut self) {
        self.ticks = 0;
        self.rewound = false;
        self.last_hour = None;
        self.snapshots.on_restart();
        self.record_hour();
    }

    /// Run one physics step regardless of the run state. The first step after
    /// a rewind drops the snapshots ahead of the restored time, as `start` does.
    pub fn tick(&mut self) -> Result<(), SimulationError> {
        if self.world.is_none() {
            return Err(SimulationError::NotLoaded);
        }
        if !self.poll_ready() {
            return Err(SimulationError::NotReady);
        }

        if self.rewound {
            self.snapshots.on_start(self.time_in_hours());
            self.rewound = false;
        }

        let increment = self.forcing_rate();
        let world = self.world.as_mut().ok_or(SimulationError::NotLoaded)?;
        world.engine.set_water_saturation_increment(increment);
        world.engine.update(&mut world.terrain.cells)?;
        world.engine.read_back(&mut world.terrain.cells);

        self.ticks += 1;
        self.record_hour();
        Ok(())
    }

    /// One animation frame: `speed_mult` ticks while running, nothing otherwise.
    /// Returns the number of ticks run.
    pub fn advance_frame(&mut self) -> Result<u32, SimulationError> {
        if !self.poll_ready() || !self.is_running() {
            return Ok(0);
        }
        for done in 0..self.config.speed_mult {
            if let Err(err) = self.tick() {
                self.stop();
                warn!(
                    target: "levee_sandbox::simulation",
                    error = %err,
                    ticks = done,
                    "simulation.frame_failed"
                );
                return Err(err);
            }
        }
        Ok(self.config.speed_mult)
    }

    /// Stage forcing for the next tick: rain rate inside the storm window,
    /// recession afterwards
    fn forcing_rate(&self) -> f32 {
        if self.time_in_hours() < self.config.rain_duration_days * HOURS_PER_DAY {
            self.config.rain_forcing.rate(self.config.rain_intensity)
        } else {
            self.config.recession_rate
        }
    }

    fn current_hour(&self) -> u64 {
        (self.ticks as f64 * f64::from(self.config.time_step) + HOUR_EPSILON).floor() as u64
    }

    fn record_hour(&mut self) {
        let hour = self.current_hour();
        if self.last_hour == Some(hour) {
            return;
        }
        self.last_hour = Some(hour);

        let time = self.time_in_hours();
        if let Some(world) = &self.world {
            self.snapshots.on_hour(hour, time, self.ticks, &world.terrain.cells);
        }
        self.events.emit(SimulationEvent::HourChange { hour });
    }

    /// Rewind to a captured snapshot. Stops the driver; returns false (and
    /// changes nothing) if the day was never captured.
    pub fn restore_snapshot(&mut self, day: u64) -> bool {
        if self.snapshots.get(day).is_none() || self.world.is_none() {
            debug!(target: "levee_sandbox::snapshots", day, "snapshot.missing");
            return false;
        }
        self.stop();

        let (Some(snapshot), Some(world)) = (self.snapshots.get(day), self.world.as_mut()) else {
            return false;
        };
        snapshot.apply(&mut world.terrain.cells);
        world.engine.sync_from_cells(&world.terrain.cells);
        self.ticks = snapshot.tick;
        self.last_hour = Some(self.current_hour());
        self.rewound = true;

        info!(
            target: "levee_sandbox::snapshots",
            day,
            time_hours = self.time_in_hours(),
            "snapshot.restored"
        );
        true
    }

    /// Raise or clear the levee on a whole bank segment.
    /// Returns whether the segment now carries a levee.
    pub fn toggle_levee(&mut self, segment: usize) -> Result<bool, SimulationError> {
        let world = self.world.as_mut().ok_or(SimulationError::NotLoaded)?;
        let cells = world
            .terrain
            .segments
            .get(segment)
            .map(|segment| &segment.cells)
            .ok_or(SimulationError::UnknownSegment(segment))?;
        let interior = world
            .terrain
            .segments
            .get(segment)
            .and_then(RiverBankSegment::interior_cell)
            .ok_or(SimulationError::UnknownSegment(segment))?;

        let height = if world.terrain.cells[interior].is_levee() {
            0.0
        } else {
            self.config.levee_height
        };
        for &idx in cells {
            world.terrain.cells[idx].levee_height = height;
        }

        // Ends may be shared with a neighbouring segment, count by the interior
        let raised = world.terrain.cells[interior].is_levee();
        if raised {
            self.levee_count += 1;
        } else {
            self.levee_count = self.levee_count.saturating_sub(1);
        }
        world.engine.sync_from_cells(&world.terrain.cells);

        debug!(
            target: "levee_sandbox::simulation",
            segment,
            raised,
            levees = self.levee_count,
            "levee.toggled"
        );
        Ok(raised)
    }

    pub fn levee_count(&self) -> usize {
        self.levee_count
    }

    /// Levees the caller may still place; the cap itself is enforced by the caller
    pub fn remaining_levees(&self) -> usize {
        self.config.max_levees.saturating_sub(self.levee_count)
    }

    pub fn set_rain_intensity(&mut self, intensity: RainIntensity) {
        self.config.rain_intensity = intensity;
    }

    pub fn set_rain_duration_in_days(&mut self, days: f32) {
        if days.is_finite() {
            self.config.rain_duration_days =
                days.clamp(config::MIN_RAIN_DURATION_DAYS, config::MAX_RAIN_DURATION_DAYS);
        }
    }

    /// New saturation baseline for every cell. Applied right away at time
    /// zero, otherwise on the next restart.
    pub fn set_initial_water_saturation(&mut self, saturation: f32) {
        if !saturation.is_finite() {
            return;
        }
        let saturation = saturation.clamp(0.0, 1.0);
        self.config.initial_water_saturation = saturation;

        let at_start = self.ticks == 0;
        let Some(world) = self.world.as_mut() else {
            return;
        };
        for cell in world.terrain.cells.iter_mut() {
            cell.initial_water_saturation = saturation;
            if at_start {
                cell.reset();
            }
        }
        if at_start {
            world.engine.sync_from_cells(&world.terrain.cells);
            self.snapshots.on_hour(0, 0.0, 0, &world.terrain.cells);
        }
    }

    /// Engine used from the next restart or reload on
    pub fn set_engine_kind(&mut self, kind: EngineKind) {
        self.config.engine = kind;
        self.preset.engine = kind;
    }

    pub fn set_speed_mult(&mut self, speed_mult: u32) {
        self.config.speed_mult = speed_mult.max(1);
    }

    pub fn subscribe<F>(&mut self, kind: SimulationEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&SimulationEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SimulationState::Ready(RunState::Running)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn time_in_hours(&self) -> f32 {
        (self.ticks as f64 * f64::from(self.config.time_step)) as f32
    }

    pub fn time_in_days(&self) -> f32 {
        self.time_in_hours() / HOURS_PER_DAY
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn terrain(&self) -> Option<&PreparedTerrain> {
        self.world.as_ref().map(|world| &world.terrain)
    }

    pub fn grid(&self) -> Option<Grid> {
        self.terrain().map(|terrain| terrain.grid)
    }

    /// Empty until terrain is loaded
    pub fn cells(&self) -> &[Cell] {
        self.terrain()
            .map(|terrain| terrain.cells.as_slice())
            .unwrap_or_default()
    }

    pub fn segments(&self) -> &[RiverBankSegment] {
        self.terrain()
            .map(|terrain| terrain.segments.as_slice())
            .unwrap_or_default()
    }

    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.world.as_ref().map(|world| world.engine.kind())
    }

    /// Surface water total reported by the engine after its last step
    pub fn water_sum(&self) -> f64 {
        self.world.as_ref().map_or(0.0, |world| world.engine.water_sum())
    }

    /// Cell under a point given in model meters
    pub fn cell_at(&self, x: f32, y: f32) -> Option<&Cell> {
        let terrain = self.terrain()?;
        let idx = terrain.grid.index_at_point(Vec2::new(x, y))?;
        terrain.cells.get(idx)
    }

    pub fn cell_at_grid(&self, x: i64, y: i64) -> Option<&Cell> {
        let terrain = self.terrain()?;
        let x = isize::try_from(x).ok()?;
        let y = isize::try_from(y).ok()?;
        let idx = terrain.grid.checked_index(x, y)?;
        terrain.cells.get(idx)
    }

    /// River stage at a configured gauge in meters
    pub fn river_depth(&self, gauge: usize) -> Option<f32> {
        let [x, y] = *self.config.river_gauges.get(gauge)?;
        let cell = self.cell_at_grid(x as i64, y as i64)?;
        Some(cell.water_saturation * self.config.river_channel_depth + cell.water_depth)
    }

    /// Flooded land in square meters. River and edge cells are not counted.
    pub fn flood_area(&self) -> f32 {
        let Some(terrain) = self.terrain() else {
            return 0.0;
        };
        let flooded = terrain
            .cells
            .iter()
            .filter(|cell| {
                !cell.is_river && !cell.is_edge && cell.water_depth > self.config.flood_depth_threshold
            })
            .count();
        flooded as f32 * terrain.grid.cell_area()
    }
}

fn build_engine(config: &SimulationConfig, terrain: &PreparedTerrain) -> Box<dyn FlowEngine> {
    create_engine(
        config.engine,
        terrain.grid,
        config.engine_params(terrain.grid.cell_size),
        &terrain.cells,
        config.parallel_workers,
    )
}
