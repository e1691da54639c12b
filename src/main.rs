use levee_sandbox::schedule::{frame_schedule, frame_world, FloodSimulation, FrameStats};
use levee_sandbox::{RainIntensity, Simulation, SimulationConfig, SimulationError, TerrainData};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const GRID_SIZE: usize = 60;
const TERRAIN_SEED: u64 = 42;
const DEMO_DAYS: f32 = 5.0;

fn main() {
    // Initialize tracing subscriber for better error visibility
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        error!("levee sandbox demo failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimulationError> {
    let (mut config, source) = SimulationConfig::load_from_env();
    if config.river_gauges.is_empty() {
        config.river_gauges = vec![[GRID_SIZE / 2, GRID_SIZE / 4], [GRID_SIZE / 2, GRID_SIZE * 3 / 4]];
    }
    info!(?source, engine = ?config.engine, "Levee sandbox starting");

    let mut sim = Simulation::new(config);
    sim.load(TerrainData::synthetic_valley(GRID_SIZE, GRID_SIZE, TERRAIN_SEED))?;
    sim.wait_until_ready()?;
    sim.set_rain_intensity(RainIntensity::Heavy);

    // Protect the first few bank segments
    let levees = sim.segments().len().min(sim.remaining_levees()).min(3);
    for segment in 0..levees {
        sim.toggle_levee(segment)?;
    }
    info!(
        levees = sim.levee_count(),
        remaining = sim.remaining_levees(),
        "Levees placed"
    );

    sim.start()?;
    let mut world = frame_world(sim);
    let mut schedule = frame_schedule();
    run_until(&mut world, &mut schedule, DEMO_DAYS)?;

    // Rewind to day 2 and replay the end of the storm
    let rewound = world
        .resource_mut::<FloodSimulation>()
        .0
        .restore_snapshot(2);
    if rewound {
        {
            let mut sim = world.resource_mut::<FloodSimulation>();
            info!(day = sim.0.time_in_days(), "Rewound");
            sim.0.start()?;
        }
        run_until(&mut world, &mut schedule, DEMO_DAYS)?;
    }

    let stats = world.resource::<FrameStats>();
    let sim = &world.resource::<FloodSimulation>().0;
    info!(
        frames = stats.frames,
        ticks = stats.ticks,
        flood_area_m2 = sim.flood_area(),
        snapshots = sim.snapshots().len(),
        "Levee sandbox finished"
    );
    Ok(())
}

fn run_until(
    world: &mut bevy_ecs::world::World,
    schedule: &mut bevy_ecs::schedule::Schedule,
    days: f32,
) -> Result<(), SimulationError> {
    loop {
        let sim = &world.resource::<FloodSimulation>().0;
        if !sim.is_running() || sim.time_in_days() >= days {
            break;
        }
        schedule.run(world);
        if let Some(err) = world.resource_mut::<FrameStats>().last_error.take() {
            return Err(err);
        }
    }
    world.resource_mut::<FloodSimulation>().0.stop();
    Ok(())
}
