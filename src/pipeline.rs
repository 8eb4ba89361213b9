//! End-to-end DSM to DTM run

use crate::config::PipelineConfig;
use crate::core::{
    CancellationToken, ExternalSolver, HoleFillStats, HoleInterpolator, MaskPreparer, MosaicAssembler,
    NoDataFinalizer, Resampler, SolveDispatcher, TileExtractor, TileGrid, TilePool, TileSolver, TileSources,
};
use crate::io::{check_compatibility, RasterIo, WorkspaceLayout};
use crate::types::{DtmError, DtmResult, TileFailure};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What a completed run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub grid: TileGrid,
    pub holes: HoleFillStats,
    pub tiles_solved: usize,
    pub tiles_copied: usize,
    pub output: PathBuf,
    pub elapsed: Duration,
}

/// Chains every stage of a run over one validated configuration
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> DtmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Share an externally controlled cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Scratch directory holding every intermediate raster
    pub fn temp_dir(&self) -> PathBuf {
        self.config.input.work_dir.join("tmp")
    }

    /// Run with the configured external solver
    pub fn run(&self) -> DtmResult<RunSummary> {
        let solver = ExternalSolver::new(&self.config.solver.program, self.config.solver_params());
        self.run_with(&solver)
    }

    pub fn run_with<S: TileSolver>(&self, solver: &S) -> DtmResult<RunSummary> {
        let started = Instant::now();
        let cfg = &self.config;
        let nodata = cfg.nodata;
        let pool = TilePool::new(cfg.processing.cpu_count);
        let tmp = self.temp_dir();
        std::fs::create_dir_all(&tmp)?;

        log::info!("🚀 Starting DTM extraction: {}", cfg.input.dsm_file.display());
        log::info!(
            "Tiles {} px, overlap {} px, {} workers",
            cfg.tiling.tile_size,
            cfg.tiling.pad_size,
            pool.threads()
        );

        check_compatibility(&cfg.input.dsm_file, &cfg.input.mask_file)?;
        if let Some(init) = &cfg.input.init_file {
            check_compatibility(&cfg.input.dsm_file, init)?;
        }

        self.checkpoint()?;
        let filled = tmp.join("MNS_filled.tif");
        let holes = HoleInterpolator::new(cfg.hole_fill_params(), pool).fill_file(&cfg.input.dsm_file, &filled)?;

        self.checkpoint()?;
        let solver_mask = tmp.join("MASQUE_solver.tif");
        MaskPreparer::new(cfg.mask.ground_value, nodata.external, nodata.mask_internal).prepare_file(
            &cfg.input.mask_file,
            &filled,
            &solver_mask,
        )?;

        let sources = TileSources {
            init: cfg.input.init_file.clone().unwrap_or_else(|| filled.clone()),
            dsm: filled,
            mask: solver_mask,
        };
        let sources = match cfg.processing.resolution {
            Some(resolution) => self.resample(&sources, resolution, &tmp)?,
            None => sources,
        };

        self.checkpoint()?;
        let info = RasterIo::info(&sources.dsm)?;
        let grid = TileGrid::plan(info.width, info.height, cfg.tiling.tile_size, cfg.tiling.pad_size)?;
        log::info!(
            "Tile grid: {}x{} tiles over {}x{} px",
            grid.nb_tiles_x,
            grid.nb_tiles_y,
            info.width,
            info.height
        );

        let layout = WorkspaceLayout::new(&tmp);
        let extraction = TileExtractor::new(&layout, pool).extract_all(&sources, &grid)?;
        if !extraction.is_complete() {
            return Err(collect_failures(extraction.failed));
        }

        self.checkpoint()?;
        let dispatch = SolveDispatcher::new(&layout, solver, nodata.external, pool, self.cancel.clone())
            .dispatch(&grid)?;
        if !dispatch.failed.is_empty() {
            return Err(collect_failures(dispatch.failed));
        }

        self.checkpoint()?;
        let assembled = tmp.join("MNT_assembled.tif");
        MosaicAssembler::new(&layout)
            .with_cancellation(self.cancel.clone())
            .assemble(&grid, &assembled)?;

        self.checkpoint()?;
        if let Some(parent) = cfg.input.output_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        NoDataFinalizer::new(nodata.external).finalize_file(&assembled, &sources.dsm, &cfg.input.output_file)?;

        if cfg.processing.clean_temp {
            clean_temp(&tmp)?;
        }

        let summary = RunSummary {
            grid,
            holes,
            tiles_solved: dispatch.solved.len(),
            tiles_copied: dispatch.copied.len(),
            output: cfg.input.output_file.clone(),
            elapsed: started.elapsed(),
        };
        log::info!(
            "✅ DTM written to {} in {:.1}s",
            summary.output.display(),
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    fn resample(&self, sources: &TileSources, resolution: f64, tmp: &Path) -> DtmResult<TileSources> {
        let resampler = Resampler::new(resolution)?;
        let external = f64::from(self.config.nodata.external);
        let mask_internal = f64::from(self.config.nodata.mask_internal);

        let resampled = TileSources {
            dsm: tmp.join("MNS_resampled.tif"),
            mask: tmp.join("MASQUE_resampled.tif"),
            init: tmp.join("INIT_resampled.tif"),
        };
        resampler.resample(&sources.dsm, &resampled.dsm, external, None, &self.cancel)?;
        resampler.resample(&sources.mask, &resampled.mask, mask_internal, Some("Byte"), &self.cancel)?;
        resampler.resample(&sources.init, &resampled.init, external, None, &self.cancel)?;
        Ok(resampled)
    }

    fn checkpoint(&self) -> DtmResult<()> {
        if self.cancel.is_cancelled() {
            log::error!("Run cancelled");
            return Err(DtmError::Cancelled);
        }
        Ok(())
    }
}

fn collect_failures(failed: Vec<(crate::core::TileCoordinate, DtmError)>) -> DtmError {
    let failures: Vec<TileFailure> = failed
        .iter()
        .map(|(coord, e)| TileFailure::new(coord.x, coord.y, e))
        .collect();
    for failure in &failures {
        log::error!("❌ {}", failure);
    }
    DtmError::TileFailures(failures)
}

/// Remove the scratch directory of a run
pub fn clean_temp<P: AsRef<Path>>(tmp: P) -> DtmResult<()> {
    let tmp = tmp.as_ref();
    if tmp.exists() {
        log::info!("Removing temporary files: {}", tmp.display());
        std::fs::remove_dir_all(tmp)?;
    }
    Ok(())
}
