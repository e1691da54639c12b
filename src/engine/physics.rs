//! Per-cell physics kernels shared by both flow engines.
//!
//! Each function works on plain numbers so the sequential engine (walking
//! `Cell`s) and the parallel engine (walking packed channel buffers) run the
//! exact same rules.

use crate::engine::EngineParams;

/// Surface water plus saturation of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterColumn {
    pub depth: f32,
    pub saturation: f32,
}

/// Damped virtual-pipe outflow towards one neighbour.
/// Only flows downhill; `head` is the surface elevation difference source - target.
#[inline]
pub fn pipe_flux(previous: f32, head: f32, params: &EngineParams) -> f32 {
    if head <= 0.0 {
        return 0.0;
    }
    (params.damping_factor * previous + params.time_step * params.pipe_conductance * head).max(0.0)
}

/// Scale all four outflows down proportionally so they never exceed the water on hand
#[inline]
pub fn clamp_outflow(fluxes: [f32; 4], available: f32) -> [f32; 4] {
    let total: f32 = fluxes.iter().sum();
    if total <= available || total <= 0.0 {
        return fluxes;
    }
    let scale = available.max(0.0) / total;
    fluxes.map(|flux| flux * scale)
}

/// Depth after exchanging flux with the neighbours, floored at zero
#[inline]
pub fn settle_depth(depth: f32, inflow: f32, outflow: f32) -> f32 {
    (depth + inflow - outflow).max(0.0)
}

/// Magnitude of the net flow vector in meters of water column per hour
#[inline]
pub fn flow_velocity(fluxes: [f32; 4], dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    let [left, right, top, bottom] = fluxes;
    glam::Vec2::new(right - left, bottom - top).length() / dt
}

/// River-stage forcing for one step.
///
/// Rising stage fills saturation first. River cells turn anything above full
/// saturation into surface water; land cells stop at `initial + headroom`
/// (never above 1) and never gain surface water from the stage alone.
/// Falling stage drains river surface water first and only then lowers
/// saturation; land saturation only drops once the cell is dry.
pub fn apply_river_stage(
    column: WaterColumn,
    is_river: bool,
    initial_saturation: f32,
    params: &EngineParams,
) -> WaterColumn {
    let delta =
        params.water_saturation_increment * params.time_step * params.river_stage_increase_speed;
    if delta == 0.0 {
        return column;
    }

    if is_river {
        if delta > 0.0 {
            add_river_water(column, delta, params.river_channel_depth)
        } else {
            remove_river_water(column, -delta, params.river_channel_depth)
        }
    } else {
        let ceiling = (initial_saturation + params.land_saturation_headroom).min(1.0);
        if delta > 0.0 {
            add_land_water(column, delta, ceiling)
        } else {
            remove_land_water(column, -delta)
        }
    }
}

fn add_river_water(mut column: WaterColumn, rise: f32, channel_depth: f32) -> WaterColumn {
    let room = (1.0 - column.saturation).max(0.0);
    let absorbed = rise.min(room);
    column.saturation += absorbed;
    let overflow = rise - absorbed;
    if overflow > 0.0 {
        column.depth += overflow * channel_depth;
    }
    column
}

fn remove_river_water(mut column: WaterColumn, fall: f32, channel_depth: f32) -> WaterColumn {
    if column.depth > 0.0 {
        let drained = fall * channel_depth;
        if drained < column.depth {
            column.depth -= drained;
        } else {
            // Stage stays pinned at bank-full on the step the channel empties
            column.depth = 0.0;
            column.saturation = 1.0;
        }
    } else {
        column.saturation = (column.saturation - fall).max(0.0);
    }
    column
}

fn add_land_water(mut column: WaterColumn, rise: f32, ceiling: f32) -> WaterColumn {
    if column.saturation < ceiling {
        column.saturation = (column.saturation + rise).min(ceiling);
    }
    column
}

fn remove_land_water(mut column: WaterColumn, fall: f32) -> WaterColumn {
    if column.depth <= 0.0 {
        column.saturation = (column.saturation - fall).max(0.0);
    }
    column
}

/// Loss to the ground, floored at zero
#[inline]
pub fn infiltrate(depth: f32, permeability: f32, params: &EngineParams) -> f32 {
    (depth - permeability * params.flood_permeability_mult * params.time_step).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(increment: f32) -> EngineParams {
        EngineParams {
            water_saturation_increment: increment,
            time_step: 1.0,
            river_stage_increase_speed: 1.0,
            river_channel_depth: 2.0,
            land_saturation_headroom: 0.2,
            ..EngineParams::default()
        }
    }

    #[test]
    fn clamp_scales_proportionally() {
        let clamped = clamp_outflow([0.4, 0.4, 0.2, 0.0], 0.5);
        assert!((clamped.iter().sum::<f32>() - 0.5).abs() < 1e-6);
        assert!((clamped[0] - 0.2).abs() < 1e-6);
        assert!((clamped[2] - 0.1).abs() < 1e-6);
        assert_eq!(clamp_outflow([0.1, 0.0, 0.0, 0.0], 1.0), [0.1, 0.0, 0.0, 0.0]);
        assert_eq!(clamp_outflow([0.1, 0.1, 0.0, 0.0], 0.0), [0.0; 4]);
    }

    #[test]
    fn no_flux_uphill() {
        let p = EngineParams::default();
        assert_eq!(pipe_flux(0.3, 0.0, &p), 0.0);
        assert_eq!(pipe_flux(0.3, -1.0, &p), 0.0);
        assert!(pipe_flux(0.0, 1.0, &p) > 0.0);
    }

    #[test]
    fn rising_stage_floods_river_but_not_land() {
        let p = params(0.1);
        let mut river = WaterColumn {
            depth: 0.0,
            saturation: 0.5,
        };
        let mut land = river;

        for _ in 0..20 {
            river = apply_river_stage(river, true, 0.5, &p);
            land = apply_river_stage(land, false, 0.5, &p);
            assert_eq!(land.depth, 0.0);
            assert!(land.saturation <= 0.7 + 1e-6);
        }

        // 2.0 of stage: 0.5 fills saturation, 1.5 becomes 3 m of water
        assert!((river.saturation - 1.0).abs() < 1e-6);
        assert!((river.depth - 3.0).abs() < 1e-4);
        assert!((land.saturation - 0.7).abs() < 1e-6);
    }

    #[test]
    fn recession_drains_depth_then_saturation() {
        let p = params(-0.1);
        let mut river = WaterColumn {
            depth: 0.5,
            saturation: 1.0,
        };

        river = apply_river_stage(river, true, 0.5, &p);
        assert!((river.depth - 0.3).abs() < 1e-6);
        assert_eq!(river.saturation, 1.0);

        river = apply_river_stage(river, true, 0.5, &p);
        assert!((river.depth - 0.1).abs() < 1e-6);
        river = apply_river_stage(river, true, 0.5, &p);
        assert_eq!(river.depth, 0.0);
        assert_eq!(river.saturation, 1.0);

        river = apply_river_stage(river, true, 0.5, &p);
        assert!((river.saturation - 0.9).abs() < 1e-6);
    }

    #[test]
    fn flooded_land_keeps_saturation_during_recession() {
        let p = params(-0.5);
        let wet = WaterColumn {
            depth: 0.2,
            saturation: 0.7,
        };
        assert_eq!(apply_river_stage(wet, false, 0.5, &p), wet);

        let dry = WaterColumn {
            depth: 0.0,
            saturation: 0.3,
        };
        assert_eq!(apply_river_stage(dry, false, 0.5, &p).saturation, 0.0);
    }

    #[test]
    fn infiltration_never_goes_negative() {
        let p = EngineParams {
            flood_permeability_mult: 2.0,
            time_step: 0.5,
            ..EngineParams::default()
        };
        assert!((infiltrate(1.0, 0.1, &p) - 0.9).abs() < 1e-6);
        assert_eq!(infiltrate(0.01, 1.0, &p), 0.0);
    }
}
