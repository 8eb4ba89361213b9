use crate::core::pool::TilePool;
use crate::io::RasterIo;
use crate::types::{DtmError, DtmResult, Elevation, ElevationGrid};
use ndarray::Array2;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};
use std::path::Path;

/// Hole-filling parameters
#[derive(Debug, Clone, Copy)]
pub struct HoleFillParams {
    /// Value marking holes to fill
    pub internal_no_data: Elevation,
    /// Value marking pixels outside the surveyed extent (never a sample, never filled)
    pub external_no_data: Elevation,
    /// Restrict interpolation samples to valid pixels within this many pixels of a hole
    pub edge_size: Option<usize>,
}

/// Outcome of a hole-filling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleFillStats {
    pub holes: usize,
    pub filled: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    position: Point2<f64>,
    value: f64,
}

impl HasPosition for Sample {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// Fills internal no-data by linear interpolation over a Delaunay
/// triangulation of valid samples. Holes outside the convex hull of the
/// samples keep their sentinel.
pub struct HoleInterpolator {
    params: HoleFillParams,
    pool: TilePool,
}

impl HoleInterpolator {
    pub fn new(params: HoleFillParams, pool: TilePool) -> Self {
        Self { params, pool }
    }

    /// Fill holes of the raster at `input` and write the result to `output`
    pub fn fill_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> DtmResult<HoleFillStats> {
        log::info!("Filling DSM holes: {}", input.as_ref().display());
        let mut raster = RasterIo::read::<Elevation, _>(&input)?;
        let stats = self.fill(&mut raster.data)?;
        RasterIo::write(&raster, &output)?;
        Ok(stats)
    }

    /// Fill holes in place
    pub fn fill(&self, dsm: &mut ElevationGrid) -> DtmResult<HoleFillStats> {
        let internal = self.params.internal_no_data;
        let holes: Vec<(usize, usize)> = dsm
            .indexed_iter()
            .filter(|(_, &v)| v == internal)
            .map(|(idx, _)| idx)
            .collect();

        if holes.is_empty() {
            log::info!("No holes detected, nothing to interpolate");
            return Ok(HoleFillStats::default());
        }

        let samples = self.collect_samples(dsm, &holes);
        if samples.is_empty() {
            log::warn!("{} holes but no valid sample to interpolate from", holes.len());
            return Ok(HoleFillStats {
                holes: holes.len(),
                ..Default::default()
            });
        }
        let sample_count = samples.len();
        log::debug!("Triangulating {} samples for {} holes", sample_count, holes.len());

        let triangulation = DelaunayTriangulation::<Sample>::bulk_load(samples)
            .map_err(|e| DtmError::Processing(format!("Delaunay triangulation failed: {:?}", e)))?;

        let values = self.pool.map(&holes, |&(row, col)| {
            triangulation
                .barycentric()
                .interpolate(|v| v.data().value, Point2::new(col as f64, row as f64))
        })?;

        let mut filled = 0;
        for (&(row, col), value) in holes.iter().zip(values) {
            if let Some(value) = value {
                dsm[[row, col]] = value as Elevation;
                filled += 1;
            }
        }

        log::info!(
            "Filled {}/{} holes ({} outside the sample hull)",
            filled,
            holes.len(),
            holes.len() - filled
        );

        Ok(HoleFillStats {
            holes: holes.len(),
            filled,
            samples: sample_count,
        })
    }

    fn is_valid(&self, v: Elevation) -> bool {
        v.is_finite() && v != self.params.internal_no_data && v != self.params.external_no_data
    }

    fn collect_samples(&self, dsm: &ElevationGrid, holes: &[(usize, usize)]) -> Vec<Sample> {
        let to_sample = |(row, col): (usize, usize), v: Elevation| Sample {
            position: Point2::new(col as f64, row as f64),
            value: f64::from(v),
        };
        let all_valid = || -> Vec<Sample> {
            dsm.indexed_iter()
                .filter(|(_, &v)| self.is_valid(v))
                .map(|(idx, &v)| to_sample(idx, v))
                .collect()
        };

        let Some(edge) = self.params.edge_size else {
            return all_valid();
        };

        let (height, width) = dsm.dim();
        let mut near_hole = Array2::from_elem((height, width), false);
        for &(row, col) in holes {
            let r0 = row.saturating_sub(edge);
            let r1 = (row + edge + 1).min(height);
            let c0 = col.saturating_sub(edge);
            let c1 = (col + edge + 1).min(width);
            near_hole
                .slice_mut(ndarray::s![r0..r1, c0..c1])
                .fill(true);
        }

        let border: Vec<Sample> = dsm
            .indexed_iter()
            .filter(|(idx, &v)| near_hole[*idx] && self.is_valid(v))
            .map(|(idx, &v)| to_sample(idx, v))
            .collect();

        if border.is_empty() {
            log::warn!("No border pixel around holes, using all valid pixels");
            all_valid()
        } else {
            border
        }
    }
}
