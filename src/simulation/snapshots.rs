//! Periodic full-state capture for rewinding the timeline.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::world::{Cell, CellSnapshot};

/// Dynamic state of every cell at one point in simulated time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// Simulated hours
    pub time: f32,
    /// Tick counter the time was derived from
    pub tick: u64,
    pub cell_snapshots: Vec<CellSnapshot>,
}

impl SimulationSnapshot {
    pub fn capture(time: f32, tick: u64, cells: &[Cell]) -> Self {
        Self {
            time,
            tick,
            cell_snapshots: cells.iter().map(Cell::snapshot).collect(),
        }
    }

    /// Write the captured state back; extra cells on either side are ignored
    pub fn apply(&self, cells: &mut [Cell]) {
        for (cell, snapshot) in cells.iter_mut().zip(&self.cell_snapshots) {
            cell.restore(snapshot);
        }
    }
}

/// Sparse list of snapshots, one slot per snapshot interval
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    interval_hours: u32,
    snapshots: Vec<Option<SimulationSnapshot>>,
    max_day: u64,
}

impl SnapshotManager {
    pub fn new(interval_hours: u32) -> Self {
        Self {
            interval_hours: interval_hours.max(1),
            snapshots: Vec::new(),
            max_day: 0,
        }
    }

    pub fn interval_hours(&self) -> u32 {
        self.interval_hours
    }

    /// Slot for a whole simulated hour, if it falls on the schedule
    pub fn slot_for_hour(&self, hour: u64) -> Option<u64> {
        let interval = u64::from(self.interval_hours);
        (hour % interval == 0).then_some(hour / interval)
    }

    /// Called once per hour change. Captures when the hour is on the schedule.
    pub fn on_hour(&mut self, hour: u64, time: f32, tick: u64, cells: &[Cell]) -> bool {
        let Some(day) = self.slot_for_hour(hour) else {
            return false;
        };
        let slot = day as usize;
        if self.snapshots.len() <= slot {
            self.snapshots.resize(slot + 1, None);
        }
        self.snapshots[slot] = Some(SimulationSnapshot::capture(time, tick, cells));
        self.max_day = self.max_day.max(day);
        debug!(target: "levee_sandbox::snapshots", day, tick, "snapshot.captured");
        true
    }

    pub fn on_restart(&mut self) {
        self.snapshots.clear();
        self.max_day = 0;
    }

    /// Drop every snapshot after `time` so replaying from a rewound point
    /// cannot mix timelines
    pub fn on_start(&mut self, time: f32) {
        let day = (time.max(0.0) / self.interval_hours as f32).floor() as u64;
        let keep = day as usize + 1;
        if self.snapshots.len() > keep {
            debug!(
                target: "levee_sandbox::snapshots",
                kept = keep,
                dropped = self.snapshots.len() - keep,
                "snapshot.truncated"
            );
            self.snapshots.truncate(keep);
        }
        self.max_day = day;
    }

    pub fn get(&self, day: u64) -> Option<&SimulationSnapshot> {
        self.snapshots.get(day as usize).and_then(Option::as_ref)
    }

    /// Highest captured slot on the current timeline
    pub fn max_day(&self) -> u64 {
        self.max_day
    }

    /// Number of captured snapshots
    pub fn len(&self) -> usize {
        self.snapshots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
