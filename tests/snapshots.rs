use levee_sandbox::{
    EngineKind, RainIntensity, Simulation, SimulationConfig, SimulationState, TerrainData,
};

const GRID_SIZE: usize = 30;
const DAYS: u64 = 5;

fn config(engine: EngineKind) -> SimulationConfig {
    SimulationConfig {
        model_width: 300.0,
        model_height: 300.0,
        river_bank_segment_length: 5,
        engine,
        parallel_workers: 2,
        ..SimulationConfig::default()
    }
}

fn loaded(engine: EngineKind) -> Simulation {
    let mut sim = Simulation::new(config(engine));
    sim.load(TerrainData::synthetic_valley(GRID_SIZE, GRID_SIZE, 17))
        .unwrap();
    sim.wait_until_ready().unwrap();
    sim
}

fn ticks_for_days(sim: &Simulation, days: u64) -> u64 {
    (days as f32 * 24.0 / sim.config().time_step).round() as u64
}

fn run_to(sim: &mut Simulation, ticks: u64) {
    while sim.ticks() < ticks {
        sim.tick().unwrap();
    }
}

fn assert_rewind_replays_exactly(engine: EngineKind) {
    let mut reference = loaded(engine);
    let end = ticks_for_days(&reference, DAYS);
    reference.start().unwrap();
    run_to(&mut reference, end);

    let mut rewound = loaded(engine);
    rewound.start().unwrap();
    run_to(&mut rewound, end);
    assert_eq!(rewound.snapshots().max_day(), DAYS);
    assert_eq!(rewound.snapshots().len(), DAYS as usize + 1);

    assert!(rewound.restore_snapshot(2));
    assert_eq!(rewound.state(), SimulationState::Ready(levee_sandbox::simulation::RunState::Idle));
    assert_eq!(rewound.ticks(), ticks_for_days(&rewound, 2));
    assert_eq!(
        rewound.cells()[0].water_depth,
        rewound.snapshots().get(2).unwrap().cell_snapshots[0].water_depth
    );

    rewound.start().unwrap();
    assert_eq!(rewound.snapshots().max_day(), 2);
    assert!(rewound.snapshots().get(3).is_none());
    run_to(&mut rewound, end);

    assert_eq!(rewound.cells(), reference.cells());
    assert_eq!(rewound.snapshots().get(DAYS), reference.snapshots().get(DAYS));
    assert!(reference.cells().iter().all(|cell| cell.water_depth >= 0.0));
}

#[test]
fn sequential_rewind_replays_exactly() {
    assert_rewind_replays_exactly(EngineKind::Sequential);
}

#[test]
fn parallel_rewind_replays_exactly() {
    assert_rewind_replays_exactly(EngineKind::Parallel);
}

#[test]
fn missing_day_is_a_no_op() {
    let mut sim = loaded(EngineKind::Sequential);
    sim.start().unwrap();
    run_to(&mut sim, 30);
    let before = sim.cells().to_vec();

    assert!(!sim.restore_snapshot(7));
    assert!(sim.is_running());
    assert_eq!(sim.ticks(), 30);
    assert_eq!(sim.cells(), before.as_slice());
}

#[test]
fn restart_discards_history() {
    let mut sim = loaded(EngineKind::Sequential);
    sim.start().unwrap();
    let end = ticks_for_days(&sim, 2);
    run_to(&mut sim, end);
    assert_eq!(sim.snapshots().max_day(), 2);

    sim.restart().unwrap();
    assert_eq!(sim.ticks(), 0);
    assert_eq!(sim.snapshots().max_day(), 0);
    assert_eq!(sim.snapshots().len(), 1);
    assert!(sim.snapshots().get(1).is_none());
    assert!(sim.restore_snapshot(0));
}

#[test]
fn stepping_after_rewind_drops_the_abandoned_future() {
    let mut sim = loaded(EngineKind::Sequential);
    sim.start().unwrap();
    let end = ticks_for_days(&sim, DAYS);
    run_to(&mut sim, end);
    assert_eq!(sim.snapshots().max_day(), DAYS);
    let old_day_two = sim.snapshots().get(2).cloned().unwrap();

    assert!(sim.restore_snapshot(1));
    sim.toggle_levee(0).unwrap();
    sim.set_rain_intensity(RainIntensity::Extreme);
    assert!(!sim.is_running());
    // nothing is dropped until the timeline actually moves
    assert!(sim.snapshots().get(4).is_some());

    let target = ticks_for_days(&sim, 2) + 10;
    run_to(&mut sim, target);
    assert!(!sim.is_running());
    assert_eq!(sim.snapshots().max_day(), 2);
    for day in 3..=DAYS {
        assert!(sim.snapshots().get(day).is_none(), "day {day}");
    }
    assert!(!sim.restore_snapshot(4));

    let new_day_two = sim.snapshots().get(2).unwrap();
    assert_eq!(new_day_two.tick, old_day_two.tick);
    assert_ne!(new_day_two.cell_snapshots, old_day_two.cell_snapshots);
}
