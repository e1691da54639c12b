//! Simulation presets and tunables.
//!
//! Loaded from JSON (`LEVEE_SANDBOX_CONFIG` overrides the builtin preset).

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{EngineKind, EngineParams};
use crate::error::ConfigError;
use crate::world::TerrainSettings;

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("../data/default_config.json");

pub const CONFIG_PATH_ENV: &str = "LEVEE_SANDBOX_CONFIG";

pub const MIN_RAIN_DURATION_DAYS: f32 = 1.0;
pub const MAX_RAIN_DURATION_DAYS: f32 = 4.0;

/// Rain slider levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RainIntensity {
    Light,
    #[default]
    Medium,
    Heavy,
    Extreme,
}

/// River-stage rise per hour for each rain level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainForcing {
    pub light: f32,
    pub medium: f32,
    pub heavy: f32,
    pub extreme: f32,
}

impl Default for RainForcing {
    fn default() -> Self {
        Self {
            light: 0.004,
            medium: 0.008,
            heavy: 0.015,
            extreme: 0.03,
        }
    }
}

impl RainForcing {
    pub fn rate(&self, intensity: RainIntensity) -> f32 {
        match intensity {
            RainIntensity::Light => self.light,
            RainIntensity::Medium => self.medium,
            RainIntensity::Heavy => self.heavy,
            RainIntensity::Extreme => self.extreme,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // Terrain
    /// Model extent in meters
    pub model_width: f32,
    /// Must give the same cell size as `model_width` on the loaded grid
    pub model_height: f32,
    pub fill_terrain_edges: bool,
    /// Percent of `heightmap_max_elevation`
    pub elevation_vertical_tilt: f32,
    pub heightmap_max_elevation: f32,
    /// Target bank segment length in cells
    pub river_bank_segment_length: usize,
    /// Infiltration rate (m/hour) per permeability zone
    pub permeability_zones: Vec<f32>,

    // Engine
    pub engine: EngineKind,
    /// 0 = one worker per core
    pub parallel_workers: usize,
    pub damping_factor: f32,
    /// Hours per tick
    pub time_step: f32,
    pub pipe_conductance: f32,
    pub flood_permeability_mult: f32,
    pub river_stage_increase_speed: f32,
    pub river_channel_depth: f32,
    pub land_saturation_headroom: f32,

    // Forcing
    pub rain_forcing: RainForcing,
    /// Stage change per hour once the rain stops (negative)
    pub recession_rate: f32,
    pub rain_intensity: RainIntensity,
    pub rain_duration_days: f32,
    pub initial_water_saturation: f32,

    // Levees
    /// Meters
    pub levee_height: f32,
    pub max_levees: usize,

    // Playback and reporting
    /// Ticks per frame
    pub speed_mult: u32,
    pub snapshot_interval_hours: u32,
    /// Minimum depth (m) for a land cell to count as flooded
    pub flood_depth_threshold: f32,
    /// Grid coordinates of the river gauges
    pub river_gauges: Vec<[usize; 2]>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            model_width: 3000.0,
            model_height: 3000.0,
            fill_terrain_edges: true,
            elevation_vertical_tilt: 0.0,
            heightmap_max_elevation: 20.0,
            river_bank_segment_length: 12,
            permeability_zones: vec![0.0, 0.002, 0.005],

            engine: EngineKind::Sequential,
            parallel_workers: 0,
            damping_factor: 0.97,
            time_step: 0.1,
            pipe_conductance: 1.0,
            flood_permeability_mult: 1.0,
            river_stage_increase_speed: 1.0,
            river_channel_depth: 3.0,
            land_saturation_headroom: 0.2,

            rain_forcing: RainForcing::default(),
            recession_rate: -0.01,
            rain_intensity: RainIntensity::Medium,
            rain_duration_days: 2.0,
            initial_water_saturation: 0.5,

            levee_height: 1.5,
            max_levees: 10,

            speed_mult: 4,
            snapshot_interval_hours: 24,
            flood_depth_threshold: 0.01,
            river_gauges: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Short, intense storm
    pub fn flash_flood() -> Self {
        Self {
            rain_intensity: RainIntensity::Extreme,
            rain_duration_days: MIN_RAIN_DURATION_DAYS,
            initial_water_saturation: 0.7,
            ..Self::default()
        }
    }

    /// Long, gentle storm on dry ground
    pub fn slow_rise() -> Self {
        Self {
            rain_intensity: RainIntensity::Light,
            rain_duration_days: MAX_RAIN_DURATION_DAYS,
            initial_water_saturation: 0.3,
            recession_rate: -0.005,
            ..Self::default()
        }
    }

    /// Preset compiled into the binary
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_SIMULATION_CONFIG).unwrap_or_else(|err| {
            warn!(
                target: "levee_sandbox::config",
                error = %err,
                "simulation_config.builtin_invalid"
            );
            Self::default()
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Load from `LEVEE_SANDBOX_CONFIG` if set, falling back to the builtin preset
    pub fn load_from_env() -> (Self, Option<PathBuf>) {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
            match Self::from_file(&path) {
                Ok(config) => {
                    info!(
                        target: "levee_sandbox::config",
                        path = %path.display(),
                        "simulation_config.loaded=file"
                    );
                    return (config, Some(path));
                }
                Err(err) => {
                    warn!(
                        target: "levee_sandbox::config",
                        path = %path.display(),
                        error = %err,
                        "simulation_config.load_failed"
                    );
                }
            }
        }

        info!(target: "levee_sandbox::config", "simulation_config.loaded=builtin");
        (Self::builtin(), None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(self.model_width > 0.0) || !(self.model_height > 0.0) {
            return invalid(format!(
                "model size must be positive, got {}x{}",
                self.model_width, self.model_height
            ));
        }
        if !(self.time_step > 0.0) {
            return invalid(format!("time_step must be positive, got {}", self.time_step));
        }
        if !(self.damping_factor > 0.0 && self.damping_factor < 1.0) {
            return invalid(format!(
                "damping_factor must be in (0, 1), got {}",
                self.damping_factor
            ));
        }
        if self.snapshot_interval_hours == 0 {
            return invalid("snapshot_interval_hours must be at least 1".into());
        }
        if self.speed_mult == 0 {
            return invalid("speed_mult must be at least 1".into());
        }
        Ok(())
    }

    pub fn terrain_settings(&self) -> TerrainSettings {
        TerrainSettings {
            model_width: self.model_width,
            model_height: Some(self.model_height),
            fill_terrain_edges: self.fill_terrain_edges,
            elevation_vertical_tilt: self.elevation_vertical_tilt,
            heightmap_max_elevation: self.heightmap_max_elevation,
            river_bank_segment_length: self.river_bank_segment_length,
            permeability_zones: self.permeability_zones.clone(),
            initial_water_saturation: self.initial_water_saturation,
        }
    }

    pub fn engine_params(&self, cell_size: f32) -> EngineParams {
        EngineParams {
            cell_size,
            damping_factor: self.damping_factor,
            time_step: self.time_step,
            pipe_conductance: self.pipe_conductance,
            flood_permeability_mult: self.flood_permeability_mult,
            water_saturation_increment: 0.0,
            river_stage_increase_speed: self.river_stage_increase_speed,
            river_channel_depth: self.river_channel_depth,
            land_saturation_headroom: self.land_saturation_headroom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_default() {
        let builtin = SimulationConfig::from_json_str(BUILTIN_SIMULATION_CONFIG).unwrap();
        assert_eq!(builtin, SimulationConfig::default());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "engine": "parallel", "rain_intensity": "heavy", "max_levees": 3 }"#,
        )
        .unwrap();
        assert_eq!(config.engine, EngineKind::Parallel);
        assert_eq!(config.rain_intensity, RainIntensity::Heavy);
        assert_eq!(config.max_levees, 3);
        assert_eq!(config.time_step, 0.1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = SimulationConfig::from_json_str(r#"{ "damping_factor": 1.5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = SimulationConfig::from_json_str(r#"{ "time_step": 0.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = SimulationConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SimulationConfig::from_file(Path::new("/nonexistent/levee.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn rain_table_lookup() {
        let forcing = RainForcing::default();
        assert!(forcing.rate(RainIntensity::Light) < forcing.rate(RainIntensity::Extreme));
        assert_eq!(forcing.rate(RainIntensity::Heavy), 0.015);
    }

    #[test]
    fn presets_are_valid() {
        assert!(SimulationConfig::flash_flood().validate().is_ok());
        assert!(SimulationConfig::slow_rise().validate().is_ok());
    }
}
