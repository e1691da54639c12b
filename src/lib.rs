//! Grid-based flood simulation: terrain preprocessing, river-bank levee
//! segments, two interchangeable flow engines and reversible playback.

pub mod engine;
pub mod error;
pub mod schedule;
pub mod simulation;
pub mod world;

pub use engine::{EngineKind, EngineParams, FlowEngine, ParallelFlowEngine, SequentialFlowEngine};
pub use error::{ConfigError, EngineError, SimulationError, TerrainError};
pub use simulation::{
    RainIntensity, Simulation, SimulationConfig, SimulationEvent, SimulationEventKind,
    SimulationSnapshot, SimulationState, SnapshotManager,
};
pub use world::{Cell, CellSnapshot, Grid, PreparedTerrain, RiverBankSegment, TerrainData};
