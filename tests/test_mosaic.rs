mod common;

use common::*;
use ndarray::Array2;
use tempfile::TempDir;
use terrain_tiler::core::TileCoordinate;
use terrain_tiler::{DtmError, RasterIo, TileGrid, WorkspaceLayout};

#[test]
fn test_uniform_tiles_blend_to_same_value() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(50, 46, 30, 10).unwrap();
    assert_eq!((grid.nb_tiles_x, grid.nb_tiles_y), (2, 2));

    let output = tile_round_trip(dir.path(), Array2::from_elem((46, 50), 42.25), &grid, &IdentitySolver).unwrap();

    let mosaic = RasterIo::read::<f32, _>(&output).unwrap();
    assert_eq!(mosaic.data.dim(), (46, 50));
    assert!(mosaic.data.iter().all(|&v| v == 42.25));
}

#[test]
fn test_zero_overlap_is_plain_concatenation() {
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(60, 45, 20, 0).unwrap();
    assert_eq!((grid.nb_tiles_x, grid.nb_tiles_y), (3, 3));

    let dsm = Array2::from_shape_fn((45, 60), |(r, c)| (r * 1000 + c) as f32);
    let output = tile_round_trip(dir.path(), dsm.clone(), &grid, &IdentitySolver).unwrap();

    let mosaic = RasterIo::read::<f32, _>(&output).unwrap();
    assert_eq!(mosaic.data, dsm);
    assert_eq!(mosaic.transform, origin());
}

#[test]
fn test_seams_are_feathered() {
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(50, 20, 30, 10).unwrap();
    assert_eq!((grid.nb_tiles_x, grid.nb_tiles_y), (2, 1));
    let dsm = Array2::from_elem((20, 50), 0.0f32);
    let layout = WorkspaceLayout::new(dir.path().join("tmp"));

    // second tile solved to a constant offset
    struct OffsetSolver;
    impl terrain_tiler::TileSolver for OffsetSolver {
        fn solve(
            &self,
            ws: &terrain_tiler::io::TileWorkspace,
            _cancel: &terrain_tiler::CancellationToken,
        ) -> terrain_tiler::DtmResult<terrain_tiler::core::ToolExit> {
            let mut tile = RasterIo::read::<f32, _>(ws.dsm_path())?;
            tile.data.fill(if ws.coord.x == 0 { 0.0 } else { 9.0 });
            RasterIo::write(&tile, ws.dtm_path())?;
            Ok(terrain_tiler::core::ToolExit::Success)
        }
    }

    let output = tile_round_trip(dir.path(), dsm, &grid, &OffsetSolver).unwrap();
    let mosaic = RasterIo::read::<f32, _>(&output).unwrap();
    let row: Vec<f32> = mosaic.data.row(7).to_vec();

    // overlap is columns 20..30, ramp step 1/9
    assert!(row[..20].iter().all(|&v| v == 0.0));
    assert_eq!(row[20], 0.0);
    assert_eq!(row[24], 4.0);
    assert_eq!(row[29], 9.0);
    assert!(row[30..].iter().all(|&v| v == 9.0));
    assert!(row.windows(2).all(|w| w[0] <= w[1]));
    assert!(layout.corrected_tile_path(TileCoordinate::new(1, 0)).exists());
}

#[test]
fn test_missing_tile_is_fatal() {
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(50, 46, 30, 10).unwrap();
    tile_round_trip(dir.path(), Array2::from_elem((46, 50), 1.0), &grid, &IdentitySolver).unwrap();

    let layout = WorkspaceLayout::new(dir.path().join("tmp"));
    let missing = layout.tile(TileCoordinate::new(1, 1)).dtm_path();
    std::fs::remove_file(&missing).unwrap();

    let output = dir.path().join("second.tif");
    let err = terrain_tiler::MosaicAssembler::new(&layout)
        .assemble(&grid, &output)
        .unwrap_err();
    match err {
        DtmError::MissingTile { x, y, path } => {
            assert_eq!((x, y), (1, 1));
            assert_eq!(path, missing);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!output.exists());
}

#[test]
fn test_rerun_does_not_reuse_stale_tiles() {
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(50, 46, 30, 10).unwrap();
    tile_round_trip(dir.path(), Array2::from_elem((46, 50), 1.0), &grid, &IdentitySolver).unwrap();

    let err = tile_round_trip(dir.path(), Array2::from_elem((46, 50), 7.0), &grid, &SilentSolver).unwrap_err();
    assert!(matches!(err, DtmError::MissingTile { .. }));

    let layout = WorkspaceLayout::new(dir.path().join("tmp"));
    for coord in grid.coordinates() {
        assert!(!layout.tile(coord).dtm_path().exists());
    }
}

#[test]
fn test_cancelled_assembly_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let grid = TileGrid::plan(50, 46, 30, 10).unwrap();
    tile_round_trip(dir.path(), Array2::from_elem((46, 50), 1.0), &grid, &IdentitySolver).unwrap();

    let cancel = terrain_tiler::CancellationToken::new();
    cancel.cancel();
    let layout = WorkspaceLayout::new(dir.path().join("tmp"));
    let output = dir.path().join("cancelled.tif");
    let err = terrain_tiler::MosaicAssembler::new(&layout)
        .with_cancellation(cancel)
        .assemble(&grid, &output)
        .unwrap_err();

    assert!(matches!(err, DtmError::Cancelled));
    assert!(!output.exists());
}
