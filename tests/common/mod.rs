#![allow(dead_code)]

use ndarray::Array2;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use terrain_tiler::core::{CancellationToken, TileSolver, ToolExit};
use terrain_tiler::io::TileWorkspace;
use terrain_tiler::{DtmResult, GeoTransform, Raster, RasterIo};

pub const EXTERNAL: f32 = -32768.0;
pub const INTERNAL: f32 = -32767.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn origin() -> GeoTransform {
    GeoTransform::north_up(650_000.0, 6_860_000.0, 0.5)
}

/// Smooth but non-trivial surface
pub fn terrain(height: usize, width: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let (x, y) = (c as f32, r as f32);
        120.0 + 0.3 * x - 0.2 * y + ((x * 0.1).sin() * (y * 0.07).cos()) * 4.0
    })
}

pub fn write_f32(path: &Path, data: Array2<f32>) {
    let raster = Raster::new(data, origin(), String::new(), Some(f64::from(EXTERNAL)));
    RasterIo::write(&raster, path).unwrap();
}

pub fn write_u8(path: &Path, data: Array2<u8>) {
    let raster = Raster::new(data, origin(), String::new(), None);
    RasterIo::write(&raster, path).unwrap();
}

/// Copies the tile DSM to the output slot
pub struct IdentitySolver;

impl TileSolver for IdentitySolver {
    fn solve(&self, workspace: &TileWorkspace, _cancel: &CancellationToken) -> DtmResult<ToolExit> {
        std::fs::copy(workspace.dsm_path(), workspace.dtm_path())?;
        Ok(ToolExit::Success)
    }
}

/// Identity solver that counts its invocations
#[derive(Default)]
pub struct CountingSolver {
    pub calls: AtomicUsize,
}

impl CountingSolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TileSolver for CountingSolver {
    fn solve(&self, workspace: &TileWorkspace, cancel: &CancellationToken) -> DtmResult<ToolExit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        IdentitySolver.solve(workspace, cancel)
    }
}

/// Reports success without writing any output
pub struct SilentSolver;

impl TileSolver for SilentSolver {
    fn solve(&self, _workspace: &TileWorkspace, _cancel: &CancellationToken) -> DtmResult<ToolExit> {
        Ok(ToolExit::Success)
    }
}

/// Writes a partial output and fails on one tile, identity elsewhere
pub struct FailingSolver {
    pub x: usize,
    pub y: usize,
    pub code: i32,
}

impl TileSolver for FailingSolver {
    fn solve(&self, workspace: &TileWorkspace, cancel: &CancellationToken) -> DtmResult<ToolExit> {
        if (workspace.coord.x, workspace.coord.y) == (self.x, self.y) {
            std::fs::write(workspace.dtm_path(), b"partial")?;
            return Ok(ToolExit::Failed(self.code));
        }
        IdentitySolver.solve(workspace, cancel)
    }
}

/// `/bin/sh` stand-in for the solver executable: copies its first argument to its fourth
#[cfg(unix)]
pub fn identity_script(dir: &Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("identity_solver.sh");
    std::fs::write(&path, "#!/bin/sh\ncp \"$1\" \"$4\"\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Extract, solve and assemble `dsm` over `grid`; returns the mosaic path
pub fn tile_round_trip<S: TileSolver>(
    dir: &Path,
    dsm: Array2<f32>,
    grid: &terrain_tiler::TileGrid,
    solver: &S,
) -> DtmResult<std::path::PathBuf> {
    use terrain_tiler::core::{SolveDispatcher, TileExtractor, TilePool, TileSources};
    use terrain_tiler::{MosaicAssembler, WorkspaceLayout};

    let sources = TileSources {
        dsm: dir.join("dsm.tif"),
        mask: dir.join("mask.tif"),
        init: dir.join("dsm.tif"),
    };
    write_u8(&sources.mask, Array2::zeros(dsm.dim()));
    write_f32(&sources.dsm, dsm);

    let layout = WorkspaceLayout::new(dir.join("tmp"));
    let pool = TilePool::new(4);
    let extraction = TileExtractor::new(&layout, pool).extract_all(&sources, grid)?;
    assert!(extraction.is_complete());

    SolveDispatcher::new(&layout, solver, EXTERNAL, pool, CancellationToken::new()).dispatch(grid)?;

    let output = dir.join("mosaic.tif");
    MosaicAssembler::new(&layout).assemble(grid, &output)?;
    Ok(output)
}
