use crate::io::RasterIo;
use crate::types::{DtmError, DtmResult, Elevation, ElevationGrid};
use ndarray::Zip;
use std::path::Path;

/// Restores the exterior no-data footprint of the source elevation on the
/// assembled terrain.
pub struct NoDataFinalizer {
    external: Elevation,
}

impl NoDataFinalizer {
    pub fn new(external: Elevation) -> Self {
        Self { external }
    }

    /// Read the assembled raster and the reference DSM, stamp the external
    /// sentinel and write the result with that sentinel as no-data tag.
    pub fn finalize_file<P, Q, R>(&self, assembled: P, reference_dsm: Q, output: R) -> DtmResult<usize>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        log::info!("Restoring exterior no-data on {}", assembled.as_ref().display());
        let terrain = RasterIo::read::<Elevation, _>(&assembled)?;
        let reference = RasterIo::read::<Elevation, _>(&reference_dsm)?;

        let (data, stamped) = self.finalize(&terrain.data, &reference.data)?;
        let mut result = terrain.with_data(data);
        result.no_data = Some(f64::from(self.external));
        RasterIo::write(&result, &output)?;

        log::info!("✅ Final DTM saved: {} ({} no-data pixels)", output.as_ref().display(), stamped);
        Ok(stamped)
    }

    /// Returns the restamped grid and the number of external pixels
    pub fn finalize(&self, terrain: &ElevationGrid, reference: &ElevationGrid) -> DtmResult<(ElevationGrid, usize)> {
        if terrain.dim() != reference.dim() {
            return Err(DtmError::ShapeMismatch {
                context: "assembled terrain vs source DSM".to_string(),
                expected: reference.dim(),
                found: terrain.dim(),
            });
        }

        let external = self.external;
        let restamp = |&t: &Elevation, &r: &Elevation| if r == external { external } else { t };

        #[cfg(feature = "parallel")]
        let data = Zip::from(terrain).and(reference).par_map_collect(restamp);
        #[cfg(not(feature = "parallel"))]
        let data = Zip::from(terrain).and(reference).map_collect(restamp);

        let stamped = reference.iter().filter(|&&r| r == external).count();
        Ok((data, stamped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_restamps_exterior() {
        let ext = -32768.0;
        let terrain = Array2::from_elem((3, 4), 12.5f32);
        let mut reference = Array2::from_elem((3, 4), 20.0f32);
        reference[[0, 0]] = ext;
        reference[[2, 3]] = ext;
        // internal holes are not exterior
        reference[[1, 1]] = -32767.0;

        let (out, stamped) = NoDataFinalizer::new(ext).finalize(&terrain, &reference).unwrap();
        assert_eq!(stamped, 2);
        assert_eq!(out[[0, 0]], ext);
        assert_eq!(out[[2, 3]], ext);
        assert_eq!(out[[1, 1]], 12.5);
        assert_eq!(out[[1, 2]], 12.5);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = NoDataFinalizer::new(-32768.0)
            .finalize(&Array2::zeros((3, 4)), &Array2::zeros((4, 3)))
            .unwrap_err();
        assert!(matches!(err, DtmError::ShapeMismatch { .. }));
    }
}
