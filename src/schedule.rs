//! `bevy_ecs` host integration.
//!
//! The frame schedule is the tick scheduler: one system run per frame, so at
//! most one tick is ever in flight.

use bevy_ecs::prelude::*;
use tracing::{info, warn};

use crate::error::SimulationError;
use crate::simulation::Simulation;

/// The driver as an ECS resource
#[derive(Resource)]
pub struct FloodSimulation(pub Simulation);

/// Per-frame bookkeeping for the host
#[derive(Resource, Default)]
pub struct FrameStats {
    pub frames: u64,
    /// Ticks run across all frames
    pub ticks: u64,
    /// Simulated days already reported
    pub reported_days: u64,
    pub last_error: Option<SimulationError>,
}

/// Run one frame of the simulation
pub fn advance_simulation(mut sim: ResMut<FloodSimulation>, mut stats: ResMut<FrameStats>) {
    stats.frames += 1;
    match sim.0.advance_frame() {
        Ok(ticks) => stats.ticks += u64::from(ticks),
        Err(err) => {
            warn!(target: "levee_sandbox::schedule", error = %err, "frame.failed");
            stats.last_error = Some(err);
        }
    }
}

/// Log the flood picture once per simulated day
pub fn report_daily(sim: Res<FloodSimulation>, mut stats: ResMut<FrameStats>) {
    let day = sim.0.time_in_days().floor() as u64;
    if day <= stats.reported_days {
        return;
    }
    stats.reported_days = day;

    let gauges: Vec<f32> = (0..sim.0.config().river_gauges.len())
        .filter_map(|gauge| sim.0.river_depth(gauge))
        .collect();
    info!(
        target: "levee_sandbox::schedule",
        day,
        flood_area_m2 = sim.0.flood_area(),
        water_sum = sim.0.water_sum(),
        ?gauges,
        "simulation.daily"
    );
}

pub fn frame_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((advance_simulation, report_daily).chain());
    schedule
}

/// World holding the simulation resources the frame schedule expects
pub fn frame_world(simulation: Simulation) -> World {
    let mut world = World::new();
    world.insert_resource(FloodSimulation(simulation));
    world.init_resource::<FrameStats>();
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationConfig;
    use crate::world::TerrainData;

    #[test]
    fn schedule_runs_speed_mult_ticks_per_frame() {
        let mut sim = Simulation::new(SimulationConfig {
            model_width: 100.0,
            model_height: 100.0,
            speed_mult: 3,
            ..SimulationConfig::default()
        });
        sim.load(TerrainData::synthetic_valley(8, 8, 3)).unwrap();
        sim.start().unwrap();

        let mut world = frame_world(sim);
        let mut schedule = frame_schedule();
        for _ in 0..4 {
            schedule.run(&mut world);
        }

        let stats = world.resource::<FrameStats>();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.ticks, 12);
        assert!(stats.last_error.is_none());
        assert_eq!(world.resource::<FloodSimulation>().0.ticks(), 12);
    }

    #[test]
    fn idle_simulation_does_not_tick() {
        let mut sim = Simulation::default();
        sim.load(TerrainData::flat(4, 4, 1.0)).unwrap();

        let mut world = frame_world(sim);
        let mut schedule = frame_schedule();
        schedule.run(&mut world);

        assert_eq!(world.resource::<FrameStats>().ticks, 0);
        assert_eq!(world.resource::<FloodSimulation>().0.ticks(), 0);
    }
}
