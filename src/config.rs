//! Run configuration, loaded from YAML

use crate::core::{HoleFillParams, SolverParams, DEFAULT_SOLVER_PROGRAM};
use crate::types::{DtmError, DtmResult, NoDataSentinels};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub tiling: TilingConfig,
    #[serde(default)]
    pub nodata: NoDataSentinels,
    #[serde(default)]
    pub mask: MaskConfig,
    #[serde(default)]
    pub hole_filling: HoleFillingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub dsm_file: PathBuf,
    pub output_file: PathBuf,
    pub work_dir: PathBuf,
    /// Ground classification, co-registered with the DSM
    pub mask_file: PathBuf,
    /// Solver initialization; the DSM when absent
    #[serde(default)]
    pub init_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Working resolution in metres; no resampling when absent
    pub resolution: Option<f64>,
    pub cpu_count: usize,
    pub clean_temp: bool,
    pub verbose: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            resolution: None,
            cpu_count: 8,
            clean_temp: false,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub program: PathBuf,
    pub sigma: f64,
    pub regul: f64,
    pub norm: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let params = SolverParams::default();
        Self {
            program: PathBuf::from(DEFAULT_SOLVER_PROGRAM),
            sigma: params.sigma,
            regul: params.lambda,
            norm: params.norm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub tile_size: usize,
    pub pad_size: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: 300,
            pad_size: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Classification value of ground pixels
    pub ground_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleFillingConfig {
    pub edge_size: Option<usize>,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the paths
    pub fn new<P: AsRef<Path>>(dsm_file: P, mask_file: P, output_file: P, work_dir: P) -> Self {
        Self {
            input: InputConfig {
                dsm_file: dsm_file.as_ref().to_path_buf(),
                output_file: output_file.as_ref().to_path_buf(),
                work_dir: work_dir.as_ref().to_path_buf(),
                mask_file: mask_file.as_ref().to_path_buf(),
                init_file: None,
            },
            processing: ProcessingConfig::default(),
            solver: SolverConfig::default(),
            tiling: TilingConfig::default(),
            nodata: NoDataSentinels::default(),
            mask: MaskConfig::default(),
            hole_filling: HoleFillingConfig::default(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> DtmResult<Self> {
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> DtmResult<Self> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DtmError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> DtmResult<String> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Parameter checks only; input files are not touched
    pub fn validate_parameters(&self) -> DtmResult<()> {
        if self.processing.cpu_count == 0 {
            return Err(DtmError::Config("cpu_count must be at least 1".to_string()));
        }
        if let Some(resolution) = self.processing.resolution {
            if !(resolution > 0.0 && resolution.is_finite()) {
                return Err(DtmError::Config(format!(
                    "resolution must be positive, got {}",
                    resolution
                )));
            }
        }
        if self.tiling.tile_size == 0 {
            return Err(DtmError::Config("tile_size must be positive".to_string()));
        }
        if self.tiling.pad_size >= self.tiling.tile_size {
            return Err(DtmError::Config(format!(
                "pad_size ({}) must be smaller than tile_size ({})",
                self.tiling.pad_size, self.tiling.tile_size
            )));
        }
        if self.solver.norm.trim().is_empty() {
            return Err(DtmError::Config("solver norm must not be empty".to_string()));
        }
        self.nodata.validate()
    }

    /// Full validation, including the existence of every input raster
    pub fn validate(&self) -> DtmResult<()> {
        self.validate_parameters()?;

        let inputs = [Some(&self.input.dsm_file), Some(&self.input.mask_file), self.input.init_file.as_ref()];
        for path in inputs.into_iter().flatten() {
            if !path.is_file() {
                return Err(DtmError::RasterNotFound(path.clone()));
            }
        }
        Ok(())
    }

    pub fn solver_params(&self) -> SolverParams {
        SolverParams {
            sigma: self.solver.sigma,
            lambda: self.solver.regul,
            no_data: f64::from(self.nodata.external),
            norm: self.solver.norm.clone(),
        }
    }

    pub fn hole_fill_params(&self) -> HoleFillParams {
        HoleFillParams {
            internal_no_data: self.nodata.internal,
            external_no_data: self.nodata.external,
            edge_size: self.hole_filling.edge_size,
        }
    }
}
