use crate::types::{DtmError, DtmResult, PixelWindow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer index of a tile in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub x: usize,
    pub y: usize,
}

impl TileCoordinate {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

/// Overlapping tile decomposition of a raster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub raster_width: usize,
    pub raster_height: usize,
    pub tile_size: usize,
    pub overlap: usize,
    pub nb_tiles_x: usize,
    pub nb_tiles_y: usize,
}

impl TileGrid {
    /// Plan the grid covering a `raster_width` x `raster_height` raster
    pub fn plan(
        raster_width: usize,
        raster_height: usize,
        tile_size: usize,
        overlap: usize,
    ) -> DtmResult<Self> {
        if tile_size == 0 {
            return Err(DtmError::Config("tile size must be positive".to_string()));
        }
        if overlap >= tile_size {
            return Err(DtmError::Config(format!(
                "overlap ({}) must be smaller than tile size ({})",
                overlap, tile_size
            )));
        }
        if raster_width == 0 || raster_height == 0 {
            return Err(DtmError::Config(format!(
                "cannot tile an empty raster ({}x{})",
                raster_width, raster_height
            )));
        }

        let nb_tiles_x = tiles_along(raster_width, tile_size, overlap);
        let nb_tiles_y = tiles_along(raster_height, tile_size, overlap);

        log::info!(
            "Tile grid: {}x{} tiles of {} px (overlap {}) over {}x{} raster",
            nb_tiles_x,
            nb_tiles_y,
            tile_size,
            overlap,
            raster_width,
            raster_height
        );

        Ok(Self {
            raster_width,
            raster_height,
            tile_size,
            overlap,
            nb_tiles_x,
            nb_tiles_y,
        })
    }

    pub fn step(&self) -> usize {
        self.tile_size - self.overlap
    }

    pub fn tile_count(&self) -> usize {
        self.nb_tiles_x * self.nb_tiles_y
    }

    /// All coordinates, row-major (y outer, x inner)
    pub fn coordinates(&self) -> Vec<TileCoordinate> {
        (0..self.nb_tiles_y)
            .flat_map(|y| (0..self.nb_tiles_x).map(move |x| TileCoordinate::new(x, y)))
            .collect()
    }

    /// Pixel window of a tile, clipped to the raster boundary.
    /// `None` for a coordinate outside the grid.
    pub fn window(&self, coord: TileCoordinate) -> Option<PixelWindow> {
        if coord.x >= self.nb_tiles_x || coord.y >= self.nb_tiles_y {
            return None;
        }
        let step = self.step();
        let col_off = coord.x * step;
        let row_off = coord.y * step;
        Some(PixelWindow::new(
            col_off,
            row_off,
            self.tile_size.min(self.raster_width - col_off),
            self.tile_size.min(self.raster_height - row_off),
        ))
    }
}

/// Number of tiles along one dimension: ceil((dim - overlap) / step), at least one.
/// A dimension no larger than a tile is a single tile spanning it.
fn tiles_along(dimension: usize, tile_size: usize, overlap: usize) -> usize {
    if dimension <= tile_size {
        return 1;
    }
    let step = tile_size - overlap;
    (dimension - overlap + step - 1) / step
}
