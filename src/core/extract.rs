use crate::core::pool::TilePool;
use crate::core::tile_grid::{TileCoordinate, TileGrid};
use crate::io::{RasterIo, TileWorkspace, WorkspaceLayout};
use crate::types::{DtmError, DtmResult, Elevation, MaskLabel, PixelWindow};
use std::path::PathBuf;

/// The three co-registered rasters cut into every tile workspace
#[derive(Debug, Clone)]
pub struct TileSources {
    pub dsm: PathBuf,
    pub mask: PathBuf,
    pub init: PathBuf,
}

/// Per-tile extraction results
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub extracted: Vec<TileCoordinate>,
    pub failed: Vec<(TileCoordinate, DtmError)>,
}

impl ExtractionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cuts source rasters into per-tile workspaces
pub struct TileExtractor<'a> {
    layout: &'a WorkspaceLayout,
    pool: TilePool,
}

impl<'a> TileExtractor<'a> {
    pub fn new(layout: &'a WorkspaceLayout, pool: TilePool) -> Self {
        Self { layout, pool }
    }

    /// Extract every tile of `grid`. Sources whose size differs from the grid
    /// are fatal; a tile that fails on its own is reported and its siblings
    /// carry on.
    pub fn extract_all(&self, sources: &TileSources, grid: &TileGrid) -> DtmResult<ExtractionReport> {
        log::info!(
            "Cutting {} tiles into {}",
            grid.tile_count(),
            self.layout.root().display()
        );
        self.check_source_shapes(sources, grid)?;
        std::fs::create_dir_all(self.layout.root())?;

        let coords = grid.coordinates();
        let results = self.pool.map(&coords, |&coord| {
            grid.window(coord)
                .ok_or_else(|| DtmError::Geometry(format!("tile {} outside the grid", coord)))
                .and_then(|window| self.extract_tile(sources, coord, window))
        })?;

        let mut report = ExtractionReport::default();
        for (coord, result) in coords.into_iter().zip(results) {
            match result {
                Ok(_) => report.extracted.push(coord),
                Err(e) => {
                    log::warn!("Extraction of tile {} failed: {}", coord, e);
                    report.failed.push((coord, e));
                }
            }
        }

        log::info!(
            "Extracted {}/{} tiles",
            report.extracted.len(),
            grid.tile_count()
        );
        Ok(report)
    }

    /// Read one window from the three sources and write them into the tile workspace
    pub fn extract_tile(
        &self,
        sources: &TileSources,
        coord: TileCoordinate,
        window: PixelWindow,
    ) -> DtmResult<TileWorkspace> {
        let workspace = self.layout.tile(coord);
        std::fs::create_dir_all(workspace.dir())?;
        log::debug!("Tile {}: window {:?}", coord, window);

        // a solved output left by an earlier run must not survive re-extraction
        remove_if_exists(&workspace.dtm_path())?;

        let dsm = RasterIo::read_window::<Elevation, _>(&sources.dsm, window)?;
        let mask = RasterIo::read_window::<MaskLabel, _>(&sources.mask, window)?;
        let init = RasterIo::read_window::<Elevation, _>(&sources.init, window)?;

        RasterIo::write(&dsm, workspace.dsm_path())?;
        RasterIo::write(&mask, workspace.mask_path())?;
        RasterIo::write(&init, workspace.init_path())?;

        Ok(workspace)
    }

    fn check_source_shapes(&self, sources: &TileSources, grid: &TileGrid) -> DtmResult<()> {
        let expected = (grid.raster_height, grid.raster_width);
        for path in [&sources.dsm, &sources.mask, &sources.init] {
            match RasterIo::info(path) {
                Ok(info) if info.shape() != expected => {
                    return Err(DtmError::ShapeMismatch {
                        context: format!("tile source {}", path.display()),
                        expected,
                        found: info.shape(),
                    });
                }
                Ok(_) => {}
                // unreadable sources surface per tile
                Err(e) if e.is_io() => log::error!("Tile source unreadable: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn remove_if_exists(path: &std::path::Path) -> DtmResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, Raster};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn write_sources(dir: &std::path::Path, width: usize, height: usize) -> TileSources {
        let gt = GeoTransform::north_up(0.0, 1000.0, 1.0);
        let dsm = Raster::new(
            Array2::from_shape_fn((height, width), |(r, c)| (r * width + c) as f32),
            gt,
            String::new(),
            Some(-32768.0),
        );
        let mask = dsm.with_data(Array2::from_shape_fn((height, width), |(r, c)| ((r + c) % 2 * 255) as u8));
        let sources = TileSources {
            dsm: dir.join("dsm.tif"),
            mask: dir.join("mask.tif"),
            init: dir.join("init.tif"),
        };
        RasterIo::write(&dsm, &sources.dsm).unwrap();
        RasterIo::write(&mask, &sources.mask).unwrap();
        RasterIo::write(&dsm, &sources.init).unwrap();
        sources
    }

    #[test]
    fn test_tiles_share_window_and_transform() {
        let dir = TempDir::new().unwrap();
        let sources = write_sources(dir.path(), 50, 40);
        let layout = WorkspaceLayout::new(dir.path().join("tiles"));
        let grid = TileGrid::plan(50, 40, 30, 10).unwrap();

        let report = TileExtractor::new(&layout, TilePool::new(2))
            .extract_all(&sources, &grid)
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.extracted.len(), 4);

        let ws = layout.tile(TileCoordinate::new(1, 1));
        let dsm = RasterIo::read::<f32, _>(ws.dsm_path()).unwrap();
        let mask = RasterIo::read::<u8, _>(ws.mask_path()).unwrap();
        let init = RasterIo::read::<f32, _>(ws.init_path()).unwrap();

        assert_eq!(dsm.data.dim(), (20, 30));
        assert_eq!(mask.data.dim(), dsm.data.dim());
        assert_eq!(init.data.dim(), dsm.data.dim());
        assert_eq!(dsm.transform, GeoTransform::north_up(20.0, 980.0, 1.0));
        assert_eq!(mask.transform, dsm.transform);
        assert_eq!(init.transform, dsm.transform);
        assert_eq!(dsm.data[[0, 0]], (20 * 50 + 20) as f32);
        assert!(!ws.dtm_path().exists());
    }

    #[test]
    fn test_missing_source_fails_per_tile() {
        let dir = TempDir::new().unwrap();
        let mut sources = write_sources(dir.path(), 50, 40);
        sources.init = dir.path().join("absent.tif");
        let layout = WorkspaceLayout::new(dir.path().join("tiles"));
        let grid = TileGrid::plan(50, 40, 30, 10).unwrap();

        let report = TileExtractor::new(&layout, TilePool::new(2))
            .extract_all(&sources, &grid)
            .unwrap();
        assert_eq!(report.failed.len(), 4);
        assert!(report.failed.iter().all(|(_, e)| e.is_io()));
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let sources = write_sources(dir.path(), 50, 40);
        let layout = WorkspaceLayout::new(dir.path().join("tiles"));
        let grid = TileGrid::plan(60, 40, 30, 10).unwrap();

        let err = TileExtractor::new(&layout, TilePool::new(1))
            .extract_all(&sources, &grid)
            .unwrap_err();
        assert!(matches!(err, DtmError::ShapeMismatch { .. }));
    }
}
