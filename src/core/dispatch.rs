use crate::core::cancel::CancellationToken;
use crate::core::pool::TilePool;
use crate::core::process::{ToolCommand, ToolExit};
use crate::core::tile_grid::{TileCoordinate, TileGrid};
use crate::io::{RasterIo, TileWorkspace, WorkspaceLayout};
use crate::types::{DtmError, DtmResult, Elevation};
use std::path::{Path, PathBuf};

/// Default name of the per-tile terrain solver executable
pub const DEFAULT_SOLVER_PROGRAM: &str = "main_GEMAUT_unit";

/// Parameters forwarded verbatim to the solver
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub sigma: f64,
    /// Regularization weight
    pub lambda: f64,
    pub no_data: f64,
    pub norm: String,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            sigma: 0.5,
            lambda: 0.01,
            no_data: -32768.0,
            norm: "hubertukey".to_string(),
        }
    }
}

/// Something that turns a tile workspace's inputs into its solved output
pub trait TileSolver: Sync {
    fn solve(&self, workspace: &TileWorkspace, cancel: &CancellationToken) -> DtmResult<ToolExit>;
}

/// Terrain solver run as a subprocess:
/// `program dsm mask init out sigma lambda nodata norm`
#[derive(Debug, Clone)]
pub struct ExternalSolver {
    program: PathBuf,
    params: SolverParams,
}

impl ExternalSolver {
    pub fn new<P: AsRef<Path>>(program: P, params: SolverParams) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            params,
        }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn command(&self, workspace: &TileWorkspace) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg(workspace.dsm_path())
            .arg(workspace.mask_path())
            .arg(workspace.init_path())
            .arg(workspace.dtm_path())
            .arg(format!("{:.5}", self.params.sigma))
            .arg(format!("{:.5}", self.params.lambda))
            .arg(format!("{:.5}", self.params.no_data))
            .arg(&self.params.norm)
    }
}

impl TileSolver for ExternalSolver {
    fn solve(&self, workspace: &TileWorkspace, cancel: &CancellationToken) -> DtmResult<ToolExit> {
        let command = self.command(workspace);
        log::debug!("Solving tile {}: {}", workspace.coord, command);
        command.run(cancel)
    }
}

/// What happened to one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Solved,
    /// All no-data: input copied to the output slot, solver skipped
    Copied,
}

/// Per-tile dispatch results
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub solved: Vec<TileCoordinate>,
    pub copied: Vec<TileCoordinate>,
    pub failed: Vec<(TileCoordinate, DtmError)>,
}

/// Runs the solver over every tile workspace on a bounded pool
pub struct SolveDispatcher<'a, S: TileSolver> {
    layout: &'a WorkspaceLayout,
    solver: &'a S,
    no_data: Elevation,
    pool: TilePool,
    cancel: CancellationToken,
}

impl<'a, S: TileSolver> SolveDispatcher<'a, S> {
    pub fn new(
        layout: &'a WorkspaceLayout,
        solver: &'a S,
        no_data: Elevation,
        pool: TilePool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            layout,
            solver,
            no_data,
            pool,
            cancel,
        }
    }

    /// Solve all tiles of the grid. Tile failures are collected in the
    /// report; cancellation fails the whole phase.
    pub fn dispatch(&self, grid: &TileGrid) -> DtmResult<DispatchReport> {
        let coords = grid.coordinates();
        log::info!(
            "🚀 Dispatching {} tiles on {} workers",
            coords.len(),
            self.pool.threads()
        );

        let results = self.pool.map(&coords, |&coord| {
            if self.cancel.is_cancelled() {
                return Err(DtmError::Cancelled);
            }
            self.dispatch_tile(coord)
        })?;

        if self.cancel.is_cancelled() {
            log::error!("Dispatch cancelled, in-flight tiles may be partial");
            return Err(DtmError::Cancelled);
        }

        let mut report = DispatchReport::default();
        for (coord, result) in coords.into_iter().zip(results) {
            match result {
                Ok(TileOutcome::Solved) => report.solved.push(coord),
                Ok(TileOutcome::Copied) => report.copied.push(coord),
                Err(e) => {
                    log::warn!("Tile {}: {}", coord, e);
                    report.failed.push((coord, e));
                }
            }
        }

        log::info!(
            "Solver finished: {} solved, {} copied, {} failed",
            report.solved.len(),
            report.copied.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Solve one tile, or copy its input when it holds no data at all
    pub fn dispatch_tile(&self, coord: TileCoordinate) -> DtmResult<TileOutcome> {
        let workspace = self.layout.tile(coord);
        let dsm = RasterIo::read::<Elevation, _>(workspace.dsm_path())?;

        if dsm.data.iter().all(|&v| is_no_data(v, self.no_data)) {
            std::fs::copy(workspace.dsm_path(), workspace.dtm_path())?;
            log::debug!("Tile {} has no valid data, copied", coord);
            return Ok(TileOutcome::Copied);
        }

        let output = workspace.dtm_path();
        if output.exists() {
            std::fs::remove_file(&output)?;
        }

        match self.solver.solve(&workspace, &self.cancel)? {
            ToolExit::Success if output.exists() => Ok(TileOutcome::Solved),
            ToolExit::Success => {
                log::warn!("Solver exited cleanly but wrote no output for tile {}", coord);
                Err(DtmError::MissingTile {
                    x: coord.x,
                    y: coord.y,
                    path: output,
                })
            }
            ToolExit::Failed(code) => {
                if output.exists() {
                    std::fs::remove_file(&output)?;
                }
                Err(DtmError::SolverExit {
                    x: coord.x,
                    y: coord.y,
                    code,
                })
            }
        }
    }
}

fn is_no_data(value: Elevation, no_data: Elevation) -> bool {
    if no_data.is_nan() {
        value.is_nan()
    } else {
        value == no_data
    }
}
