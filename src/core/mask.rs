use crate::io::RasterIo;
use crate::types::{DtmError, DtmResult, Elevation, MaskLabel, ABOVE_GROUND_LABEL, GROUND_LABEL};
use ndarray::{Array2, Zip};
use std::path::Path;

/// Converts a ground classification into the solver mask convention
/// (ground 0, everything else 255) and marks pixels that are exterior
/// no-data in the DSM with the mask-internal sentinel.
pub struct MaskPreparer {
    ground_value: f64,
    external_no_data: Elevation,
    mask_internal: MaskLabel,
}

impl MaskPreparer {
    pub fn new(ground_value: f64, external_no_data: Elevation, mask_internal: MaskLabel) -> Self {
        Self {
            ground_value,
            external_no_data,
            mask_internal,
        }
    }

    pub fn prepare_file<P, Q, R>(&self, classification: P, dsm: Q, output: R) -> DtmResult<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        log::info!("Preparing solver mask from {}", classification.as_ref().display());
        let labels = RasterIo::read::<f32, _>(&classification)?;
        let dsm = RasterIo::read::<Elevation, _>(&dsm)?;

        let mask = self.prepare(&labels.data, &dsm.data)?;
        let ground = mask.iter().filter(|&&v| v == GROUND_LABEL).count();
        log::debug!("{} ground pixels out of {}", ground, mask.len());

        let mut raster = labels.with_data(mask);
        raster.no_data = Some(f64::from(self.mask_internal));
        RasterIo::write(&raster, &output)
    }

    pub fn prepare(&self, labels: &Array2<f32>, dsm: &Array2<Elevation>) -> DtmResult<Array2<MaskLabel>> {
        if labels.dim() != dsm.dim() {
            return Err(DtmError::ShapeMismatch {
                context: "classification mask vs DSM".to_string(),
                expected: dsm.dim(),
                found: labels.dim(),
            });
        }

        Ok(Zip::from(labels).and(dsm).map_collect(|&label, &z| {
            if z == self.external_no_data {
                self.mask_internal
            } else if f64::from(label) == self.ground_value {
                GROUND_LABEL
            } else {
                ABOVE_GROUND_LABEL
            }
        }))
    }
}
