use crate::core::cancel::CancellationToken;
use crate::core::tile_grid::{TileCoordinate, TileGrid};
use crate::io::{RasterIo, WorkspaceLayout};
use crate::types::{DtmError, DtmResult, Elevation, MapBounds, PixelWindow, Raster};
use ndarray::{s, Array1, Array2, Axis, Zip};
use std::path::{Path, PathBuf};

/// Orientation of a seam between two adjacent rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeamAxis {
    /// Left/right neighbours, blended across columns
    Horizontal,
    /// Top/bottom neighbours, blended across rows
    Vertical,
}

impl SeamAxis {
    /// ndarray axis along which pieces are concatenated
    fn concat_axis(self) -> Axis {
        match self {
            SeamAxis::Horizontal => Axis(1),
            SeamAxis::Vertical => Axis(0),
        }
    }
}

/// Linear feathering ramp over an overlap window, 0 at the accumulator side
/// and 1 at the incoming side.
#[derive(Debug, Clone)]
pub struct WeightMask {
    weights: Array2<f64>,
}

impl WeightMask {
    pub fn new(height: usize, width: usize, axis: SeamAxis) -> Self {
        let weights = match axis {
            SeamAxis::Horizontal => {
                let ramp = Array1::linspace(0.0, 1.0, width);
                Array2::from_shape_fn((height, width), |(_, c)| ramp[c])
            }
            SeamAxis::Vertical => {
                let ramp = Array1::linspace(0.0, 1.0, height);
                Array2::from_shape_fn((height, width), |(r, _)| ramp[r])
            }
        };
        Self { weights }
    }

    /// Weight of the incoming raster
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Weight of the accumulator
    pub fn complement(&self) -> Array2<f64> {
        self.weights.mapv(|w| 1.0 - w)
    }
}

/// Overlap of two adjacent rasters, as a pixel window in each of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapWindow {
    pub accumulator: PixelWindow,
    pub next: PixelWindow,
}

impl OverlapWindow {
    /// Intersect map-space bounds and convert the intersection through each
    /// raster's own transform, so small transform drift between tiles does
    /// not shift the seam.
    pub fn between<T>(accumulator: &Raster<T>, next: &Raster<T>, axis: SeamAxis) -> DtmResult<Self> {
        if accumulator.transform.is_rotated() || next.transform.is_rotated() {
            return Err(DtmError::Geometry("rotated geotransforms are not supported".to_string()));
        }

        let a = accumulator.bounds();
        let b = next.bounds();
        let inter = a.intersection(&b);
        let half_px_x = accumulator.transform.pixel_width.abs() / 2.0;
        let half_px_y = accumulator.transform.pixel_height.abs() / 2.0;

        let (seam, seam_tol, cross, cross_tol) = match axis {
            SeamAxis::Horizontal => (inter.width(), half_px_x, inter.height(), half_px_y),
            SeamAxis::Vertical => (inter.height(), half_px_y, inter.width(), half_px_x),
        };
        if cross <= cross_tol || seam < -seam_tol {
            return Err(DtmError::Geometry(format!(
                "rasters do not overlap: {:?} and {:?}",
                a, b
            )));
        }

        let window = OverlapWindow {
            accumulator: to_pixel_window(&inter, accumulator),
            next: to_pixel_window(&inter, next),
        };

        let (wa, wn) = (window.accumulator, window.next);
        if (wa.height, wa.width) != (wn.height, wn.width) {
            return Err(DtmError::ShapeMismatch {
                context: "overlap window".to_string(),
                expected: (wa.height, wa.width),
                found: (wn.height, wn.width),
            });
        }

        // the accumulator's trailing edge must lie inside `next`
        let reaches_edge = match axis {
            SeamAxis::Horizontal => wa.col_end() == accumulator.width(),
            SeamAxis::Vertical => wa.row_end() == accumulator.height(),
        };
        if !reaches_edge {
            return Err(DtmError::Geometry(format!(
                "{:?} overlap {:?}/{:?} is not at the shared edge",
                axis, wa, wn
            )));
        }

        Ok(window)
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

fn to_pixel_window<T>(bounds: &MapBounds, raster: &Raster<T>) -> PixelWindow {
    let gt = &raster.transform;
    let to_px = |v: f64, limit: usize| -> usize { v.round().clamp(0.0, limit as f64) as usize };

    let c0 = (bounds.left - gt.top_left_x) / gt.pixel_width;
    let c1 = (bounds.right - gt.top_left_x) / gt.pixel_width;
    let r0 = (bounds.top - gt.top_left_y) / gt.pixel_height;
    let r1 = (bounds.bottom - gt.top_left_y) / gt.pixel_height;

    let col_off = to_px(c0.min(c1), raster.width());
    let col_end = to_px(c0.max(c1), raster.width()).max(col_off);
    let row_off = to_px(r0.min(r1), raster.height());
    let row_end = to_px(r0.max(r1), raster.height()).max(row_off);

    PixelWindow::new(col_off, row_off, col_end - col_off, row_end - row_off)
}

/// Blend the overlap into `accumulator` and return what `next` contributes
/// beyond it, georeferenced at its own origin. `None` when nothing is left.
pub fn blend_seam(
    accumulator: &mut Raster<Elevation>,
    next: &Raster<Elevation>,
    overlap: &OverlapWindow,
    axis: SeamAxis,
) -> Option<Raster<Elevation>> {
    let wa = overlap.accumulator;
    let wn = overlap.next;

    if !overlap.is_empty() {
        let mask = WeightMask::new(wn.height, wn.width, axis);
        let mut acc_view = accumulator
            .data
            .slice_mut(s![wa.row_off..wa.row_end(), wa.col_off..wa.col_end()]);
        let next_view = next
            .data
            .slice(s![wn.row_off..wn.row_end(), wn.col_off..wn.col_end()]);

        Zip::from(&mut acc_view)
            .and(&next_view)
            .and(mask.weights())
            .for_each(|a, &b, &w| {
                *a = (f64::from(*a) * (1.0 - w) + f64::from(b) * w) as Elevation;
            });
    }

    let (data, transform) = match axis {
        SeamAxis::Horizontal => {
            let start = wn.col_end();
            if start >= next.width() {
                return None;
            }
            (next.data.slice(s![.., start..]).to_owned(), next.transform.translated(start, 0))
        }
        SeamAxis::Vertical => {
            let start = wn.row_end();
            if start >= next.height() {
                return None;
            }
            (next.data.slice(s![start.., ..]).to_owned(), next.transform.translated(0, start))
        }
    };

    Some(Raster::new(data, transform, next.projection.clone(), next.no_data))
}

/// Sequentially stitch `inputs` along `axis` into `output`.
///
/// Every step blends the running accumulator with the next raster, writes the
/// accumulator back, and starts a new corrected piece from the remainder of
/// the next raster. Pieces are concatenated at the end. `corrected` names the
/// piece file for each input. `cancel` is checked before every seam.
pub fn stitch(
    inputs: &[PathBuf],
    corrected: &[PathBuf],
    axis: SeamAxis,
    output: &Path,
    cancel: &CancellationToken,
) -> DtmResult<()> {
    if inputs.is_empty() || inputs.len() != corrected.len() {
        return Err(DtmError::Processing(format!(
            "stitch needs one corrected path per input ({} inputs, {} paths)",
            inputs.len(),
            corrected.len()
        )));
    }

    let mut accumulator: Option<(PathBuf, Raster<Elevation>)> = None;
    let mut pieces: Vec<PathBuf> = Vec::with_capacity(inputs.len());

    for (input, target) in inputs.iter().zip(corrected) {
        if cancel.is_cancelled() {
            return Err(DtmError::Cancelled);
        }
        let next = RasterIo::read::<Elevation, _>(input)?;

        let piece = match accumulator.take() {
            None => next,
            Some((acc_path, mut acc)) => {
                let overlap = OverlapWindow::between(&acc, &next, axis)?;
                log::debug!(
                    "Seam {} | {}: {:?}",
                    acc_path.display(),
                    input.display(),
                    overlap.next
                );
                let remainder = blend_seam(&mut acc, &next, &overlap, axis);
                RasterIo::write(&acc, &acc_path)?;

                match remainder {
                    Some(rest) => rest,
                    None => {
                        log::warn!("{} lies entirely inside the previous overlap", input.display());
                        accumulator = Some((acc_path, acc));
                        continue;
                    }
                }
            }
        };

        RasterIo::write(&piece, target)?;
        pieces.push(target.clone());
        accumulator = Some((target.clone(), piece));
    }

    concatenate(&pieces, axis, output)
}

fn concatenate(pieces: &[PathBuf], axis: SeamAxis, output: &Path) -> DtmResult<()> {
    let rasters = pieces
        .iter()
        .map(RasterIo::read::<Elevation, _>)
        .collect::<DtmResult<Vec<_>>>()?;
    let first = rasters
        .first()
        .ok_or_else(|| DtmError::Processing("nothing to concatenate".to_string()))?;

    for (raster, path) in rasters.iter().zip(pieces) {
        let aligned = match axis {
            SeamAxis::Horizontal => raster.height() == first.height(),
            SeamAxis::Vertical => raster.width() == first.width(),
        };
        if !aligned {
            return Err(DtmError::ShapeMismatch {
                context: format!("mosaic piece {}", path.display()),
                expected: first.data.dim(),
                found: raster.data.dim(),
            });
        }
    }

    let views: Vec<_> = rasters.iter().map(|r| r.data.view()).collect();
    let data = ndarray::concatenate(axis.concat_axis(), &views)
        .map_err(|e| DtmError::Processing(format!("Failed to concatenate mosaic: {}", e)))?;

    RasterIo::write(&first.with_data(data), output)
}

/// Reassembles solved tiles into one raster: each row left to right, then the
/// rows top to bottom. Strictly sequential.
pub struct MosaicAssembler<'a> {
    layout: &'a WorkspaceLayout,
    cancel: CancellationToken,
}

impl<'a> MosaicAssembler<'a> {
    pub fn new(layout: &'a WorkspaceLayout) -> Self {
        Self {
            layout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn assemble<P: AsRef<Path>>(&self, grid: &TileGrid, output: P) -> DtmResult<()> {
        let output = output.as_ref();
        log::info!("Assembling {}x{} tiles into {}", grid.nb_tiles_x, grid.nb_tiles_y, output.display());
        self.check_all_solved(grid)?;

        for y in 0..grid.nb_tiles_y {
            let coords: Vec<TileCoordinate> = (0..grid.nb_tiles_x).map(|x| TileCoordinate::new(x, y)).collect();
            let inputs: Vec<PathBuf> = coords.iter().map(|&c| self.layout.tile(c).dtm_path()).collect();
            let corrected: Vec<PathBuf> = coords.iter().map(|&c| self.layout.corrected_tile_path(c)).collect();

            stitch(
                &inputs,
                &corrected,
                SeamAxis::Horizontal,
                &self.layout.row_mosaic_path(y),
                &self.cancel,
            )?;
            log::debug!("Row {} assembled", y);
        }

        let rows: Vec<PathBuf> = (0..grid.nb_tiles_y).map(|y| self.layout.row_mosaic_path(y)).collect();
        let corrected: Vec<PathBuf> = (0..grid.nb_tiles_y).map(|y| self.layout.corrected_row_path(y)).collect();

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        stitch(&rows, &corrected, SeamAxis::Vertical, output, &self.cancel)?;

        log::info!("✅ Mosaic saved: {}", output.display());
        Ok(())
    }

    fn check_all_solved(&self, grid: &TileGrid) -> DtmResult<()> {
        let missing: Vec<(TileCoordinate, PathBuf)> = grid
            .coordinates()
            .into_iter()
            .map(|c| (c, self.layout.tile(c).dtm_path()))
            .filter(|(_, path)| !path.exists())
            .collect();

        match missing.first() {
            None => Ok(()),
            Some((coord, path)) => {
                for (c, _) in &missing {
                    log::error!("Missing solved tile {}", c);
                }
                Err(DtmError::MissingTile {
                    x: coord.x,
                    y: coord.y,
                    path: path.clone(),
                })
            }
        }
    }
}
