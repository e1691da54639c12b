use levee_sandbox::world::banks::{mark_river_banks, partition_shores};
use levee_sandbox::world::{TerrainPreprocessor, TerrainSettings};
use levee_sandbox::{Grid, PreparedTerrain, TerrainData, TerrainError};

fn valley_settings(segment_length: usize) -> TerrainSettings {
    TerrainSettings {
        model_width: 400.0,
        fill_terrain_edges: true,
        heightmap_max_elevation: 20.0,
        river_bank_segment_length: segment_length,
        permeability_zones: vec![0.0, 0.002, 0.005],
        initial_water_saturation: 0.5,
        ..TerrainSettings::default()
    }
}

fn prepare_valley(size: usize, seed: u64, segment_length: usize) -> PreparedTerrain {
    TerrainPreprocessor::new(valley_settings(segment_length))
        .prepare(&TerrainData::synthetic_valley(size, size, seed))
        .unwrap()
}

#[test]
fn segmentation_is_deterministic() {
    let a = prepare_valley(40, 9, 6);
    let b = prepare_valley(40, 9, 6);
    assert!(!a.segments.is_empty());
    assert_eq!(a.segments, b.segments);
    assert_eq!(a.shores, b.shores);
}

#[test]
fn segments_respect_length_cap_and_shore() {
    for segment_length in [2, 5, 12] {
        let prepared = prepare_valley(50, 4, segment_length);
        for (idx, segment) in prepared.segments.iter().enumerate() {
            assert!(!segment.is_empty());
            assert!(segment.len() <= 2 * segment_length);
            for &cell_idx in &segment.cells {
                let cell = &prepared.cells[cell_idx];
                assert!(cell.is_river_bank && !cell.is_river);
                assert_eq!(prepared.shores[cell_idx], Some(segment.shore));
                assert_eq!(cell.river_bank_segment_idx, Some(idx));
            }
        }
    }
}

#[test]
fn every_bank_cell_is_claimed_once() {
    let prepared = prepare_valley(40, 2, 5);
    let mut claimed = vec![0usize; prepared.cells.len()];
    for segment in &prepared.segments {
        for &idx in &segment.cells {
            claimed[idx] += 1;
        }
    }
    for (idx, cell) in prepared.cells.iter().enumerate() {
        let expected = usize::from(cell.is_river_bank && prepared.shores[idx].is_some());
        assert_eq!(claimed[idx], expected, "cell {idx}");
    }
}

#[test]
fn river_splits_the_land_into_shores() {
    let prepared = prepare_valley(30, 1, 4);
    let labels: std::collections::HashSet<u32> =
        prepared.shores.iter().flatten().copied().collect();
    assert!(labels.len() >= 2);
    for &idx in &prepared.river_cells {
        assert_eq!(prepared.shores[idx], None);
        assert_eq!(prepared.cells[idx].permeability, 0.0);
    }
}

#[test]
fn no_river_or_zero_length_yields_no_segments() {
    let flat = TerrainPreprocessor::new(valley_settings(5))
        .prepare(&TerrainData::flat(10, 10, 2.0))
        .unwrap();
    assert!(flat.segments.is_empty());
    assert!(flat.river_cells.is_empty());

    let unsegmented = prepare_valley(30, 1, 0);
    assert!(unsegmented.segments.is_empty());
    assert!(unsegmented.cells.iter().any(|cell| cell.is_river_bank));
}

#[test]
fn banks_can_be_recomputed_on_raw_cells() {
    let prepared = prepare_valley(20, 3, 3);
    let mut cells = prepared.cells.clone();
    let grid: Grid = prepared.grid;
    let shores = partition_shores(&grid, &cells);
    let segments = mark_river_banks(&grid, &mut cells, &shores, 3);
    assert_eq!(segments, prepared.segments);
}

#[test]
fn bad_input_is_reported_not_panicked() {
    let preprocessor = TerrainPreprocessor::new(valley_settings(5));

    let mut data = TerrainData::flat(5, 5, 0.0);
    data.permeability_zones = Some(vec![0; 3]);
    assert_eq!(
        preprocessor.prepare(&data).unwrap_err(),
        TerrainError::ShapeMismatch {
            layer: "permeability",
            expected: 25,
            actual: 3
        }
    );

    assert!(matches!(
        preprocessor.prepare(&TerrainData::flat(0, 0, 0.0)),
        Err(TerrainError::InvalidDimensions {
            width: 0,
            height: 0
        })
    ));

    let zero_width = TerrainPreprocessor::new(TerrainSettings {
        model_width: 0.0,
        ..TerrainSettings::default()
    });
    assert!(matches!(
        zero_width.prepare(&TerrainData::flat(4, 4, 0.0)),
        Err(TerrainError::NonPositiveCellSize(_))
    ));

    let wide = TerrainPreprocessor::new(TerrainSettings {
        model_width: 40.0,
        model_height: Some(40.0),
        ..TerrainSettings::default()
    });
    assert_eq!(
        wide.prepare(&TerrainData::flat(4, 2, 0.0)).unwrap_err(),
        TerrainError::NonSquareCells {
            width: 10.0,
            height: 20.0
        }
    );
    let prepared = TerrainPreprocessor::new(TerrainSettings {
        model_width: 40.0,
        model_height: Some(20.0),
        ..TerrainSettings::default()
    })
    .prepare(&TerrainData::flat(4, 2, 0.0))
    .unwrap();
    assert_eq!(prepared.grid.cell_size, 10.0);
}
