//! Terrain grid, cells and load-time preprocessing.

pub mod banks;
pub mod cell;
pub mod grid;
pub mod terrain;

pub use banks::RiverBankSegment;
pub use cell::{Cell, CellSnapshot};
pub use grid::Grid;
pub use terrain::{PreparedTerrain, TerrainData, TerrainPreprocessor, TerrainSettings};
