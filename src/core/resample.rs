use crate::core::cancel::CancellationToken;
use crate::core::process::{ToolCommand, ToolExit};
use crate::types::{DtmError, DtmResult};
use std::path::Path;

/// Resamples rasters to a working resolution through `gdalwarp`
#[derive(Debug, Clone)]
pub struct Resampler {
    program: String,
    resolution: f64,
}

impl Resampler {
    pub fn new(resolution: f64) -> DtmResult<Self> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(DtmError::Config(format!("invalid working resolution {}", resolution)));
        }
        Ok(Self {
            program: "gdalwarp".to_string(),
            resolution,
        })
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// `gdalwarp -tr R R -srcnodata N -dstnodata N [-ot TYPE] in out -overwrite`
    pub fn command(&self, input: &Path, output: &Path, no_data: f64, output_type: Option<&str>) -> ToolCommand {
        let resolution = format!("{:.10}", self.resolution);
        let mut command = ToolCommand::new(&self.program)
            .arg("-tr")
            .arg(&resolution)
            .arg(&resolution)
            .arg("-srcnodata")
            .arg(no_data.to_string())
            .arg("-dstnodata")
            .arg(no_data.to_string());
        if let Some(output_type) = output_type {
            command = command.arg("-ot").arg(output_type);
        }
        command.arg(input).arg(output).arg("-overwrite")
    }

    pub fn resample(
        &self,
        input: &Path,
        output: &Path,
        no_data: f64,
        output_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> DtmResult<()> {
        let command = self.command(input, output, no_data, output_type);
        log::info!("Resampling to {} m: {}", self.resolution, input.display());
        log::debug!("{}", command);

        match command.run(cancel)? {
            ToolExit::Success => Ok(()),
            ToolExit::Failed(code) => Err(DtmError::Processing(format!(
                "gdalwarp exited with code {} on {}",
                code,
                input.display()
            ))),
        }
    }
}
