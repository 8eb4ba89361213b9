//! I/O modules for GeoTIFF rasters and the per-tile workspace layout

pub mod raster;
pub mod workspace;

pub use raster::{check_compatibility, RasterInfo, RasterIo};
pub use workspace::{TileWorkspace, WorkspaceLayout};
