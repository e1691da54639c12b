use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::world::cell::Cell;
use crate::world::grid::Grid;

/// Chain of river-adjacent cells on one shore, toggled as a single levee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverBankSegment {
    /// Cell indices in walk order
    pub cells: Vec<usize>,
    /// Shore label shared by every cell of the segment
    pub shore: u32,
}

impl RiverBankSegment {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell used to read the segment's levee state. End cells sit next to the
    /// neighbouring segment, so the middle one is used.
    pub fn interior_cell(&self) -> Option<usize> {
        self.cells.get(self.cells.len() / 2).copied()
    }
}

/// Label every non-river cell with the id of its river-separated region.
/// River cells stay `None`. Labels start at 0 and increase in scan order.
pub fn partition_shores(grid: &Grid, cells: &[Cell]) -> Vec<Option<u32>> {
    let mut shores = vec![None; cells.len()];
    let mut queue = VecDeque::new();
    let mut next_label = 0u32;

    for start in 0..cells.len() {
        if cells[start].is_river || shores[start].is_some() {
            continue;
        }

        shores[start] = Some(next_label);
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            for neighbor in grid.neighbors4(idx) {
                if !cells[neighbor].is_river && shores[neighbor].is_none() {
                    shores[neighbor] = Some(next_label);
                    queue.push_back(neighbor);
                }
            }
        }
        next_label += 1;
    }

    shores
}

/// Flag land cells with a 4-connected river neighbour. Returns how many were found.
pub fn mark_bank_cells(grid: &Grid, cells: &mut [Cell]) -> usize {
    let mut count = 0;
    for idx in 0..cells.len() {
        let is_bank = !cells[idx].is_river
            && grid
                .neighbors4(idx)
                .into_iter()
                .any(|neighbor| cells[neighbor].is_river);
        cells[idx].is_river_bank = is_bank;
        count += usize::from(is_bank);
    }
    count
}

/// Walk bank cells into simple chains and cut them into segments close to
/// `segment_length` cells. Chains never branch and never change shore.
/// Whenever a chain reaches `2 * segment_length` cells its tail is moved into
/// a new segment and the original keeps exactly `segment_length` cells.
/// A `shores` labelling of a different length yields no segments.
pub fn mark_river_banks(
    grid: &Grid,
    cells: &mut [Cell],
    shores: &[Option<u32>],
    segment_length: usize,
) -> Vec<RiverBankSegment> {
    mark_bank_cells(grid, cells);
    for cell in cells.iter_mut() {
        cell.river_bank_segment_idx = None;
    }

    let mut segments = Vec::new();
    if segment_length == 0 {
        return segments;
    }
    if shores.len() != cells.len() {
        warn!(
            target: "levee_sandbox::terrain",
            shores = shores.len(),
            cells = cells.len(),
            "banks.shore_mismatch"
        );
        return segments;
    }

    let max_length = segment_length * 2;
    let mut visited = vec![false; cells.len()];

    for seed in 0..cells.len() {
        if !cells[seed].is_river_bank || visited[seed] {
            continue;
        }
        let Some(shore) = shores[seed] else {
            continue;
        };

        visited[seed] = true;
        let mut current = vec![seed];
        let mut head = seed;

        loop {
            let next = grid.neighbors8(head).into_iter().find(|&neighbor| {
                cells[neighbor].is_river_bank
                    && !visited[neighbor]
                    && shores[neighbor] == Some(shore)
            });
            let Some(next) = next else {
                break;
            };
            visited[next] = true;

            if current.len() >= max_length {
                let tail = current.split_off(segment_length);
                segments.push(RiverBankSegment {
                    cells: current,
                    shore,
                });
                current = tail;
            }
            current.push(next);
            head = next;
        }

        segments.push(RiverBankSegment {
            cells: current,
            shore,
        });
    }

    for (segment_idx, segment) in segments.iter().enumerate() {
        for &idx in &segment.cells {
            cells[idx].river_bank_segment_idx = Some(segment_idx);
        }
    }

    segments
}
