//! Core tiling, solving and reassembly modules

pub mod cancel;
pub mod dispatch;
pub mod extract;
pub mod hole_fill;
pub mod mask;
pub mod mosaic;
pub mod nodata;
pub mod pool;
pub mod process;
pub mod resample;
pub mod tile_grid;

// Re-export main types
pub use cancel::CancellationToken;
pub use dispatch::{
    DispatchReport, ExternalSolver, SolveDispatcher, SolverParams, TileOutcome, TileSolver,
    DEFAULT_SOLVER_PROGRAM,
};
pub use extract::{ExtractionReport, TileExtractor, TileSources};
pub use hole_fill::{HoleFillParams, HoleFillStats, HoleInterpolator};
pub use mask::MaskPreparer;
pub use mosaic::{blend_seam, stitch, MosaicAssembler, OverlapWindow, SeamAxis, WeightMask};
pub use nodata::NoDataFinalizer;
pub use pool::TilePool;
pub use process::{ToolCommand, ToolExit};
pub use resample::Resampler;
pub use tile_grid::{TileCoordinate, TileGrid};
