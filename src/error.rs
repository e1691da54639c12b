use std::{io, path::PathBuf};

use thiserror::Error;

/// Problems with the raw terrain grids handed over by the data loader
#[derive(Debug, Error, PartialEq)]
pub enum TerrainError {
    #[error("terrain grid must have positive dimensions, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("{layer} layer has {actual} values, expected {expected}")]
    ShapeMismatch {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("cell size must be positive, got {0}")]
    NonPositiveCellSize(f32),
    #[error("cells must be square, model gives {width} x {height} m")]
    NonSquareCells { width: f32, height: f32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("flow engine compute context is not ready")]
    NotReady,
    #[error("flow engine compute context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("flow engine was built for {expected} cells, got {actual}")]
    GridMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid simulation config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no terrain has been loaded")]
    NotLoaded,
    #[error("simulation is not ready")]
    NotReady,
    #[error("unknown river bank segment {0}")]
    UnknownSegment(usize),
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
