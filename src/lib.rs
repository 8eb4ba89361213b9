//! terrain-tiler: Tiled DSM to DTM reconstruction
//!
//! Fills DSM holes, cuts the raster into overlapping tiles, runs an external
//! terrain solver on each tile in parallel and stitches the solved tiles back
//! into one seamless DTM with linear feather blending.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use core::{
    CancellationToken, ExternalSolver, HoleInterpolator, MosaicAssembler, NoDataFinalizer, SolveDispatcher,
    TileCoordinate, TileExtractor, TileGrid, TilePool, TileSolver,
};
pub use io::{RasterIo, WorkspaceLayout};
pub use pipeline::{clean_temp, Pipeline, RunSummary};
pub use types::{DtmError, DtmResult, GeoTransform, NoDataSentinels, Raster, TileFailure};
