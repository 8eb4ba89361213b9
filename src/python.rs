use crate::config::PipelineConfig;
use crate::core::{HoleFillParams, HoleInterpolator, TileCoordinate, TileGrid, TilePool};
use crate::pipeline::Pipeline;
use crate::types::DtmError;
use pyo3::prelude::*;

fn runtime_error(e: DtmError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyTileGrid>()?;
    m.add_function(wrap_pyfunction!(fill_holes, m)?)?;
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    Ok(())
}

/// Python wrapper for TileGrid
#[pyclass(name = "TileGrid")]
struct PyTileGrid {
    inner: TileGrid,
}

#[pymethods]
impl PyTileGrid {
    #[new]
    fn new(raster_width: usize, raster_height: usize, tile_size: usize, overlap: usize) -> PyResult<Self> {
        let grid = TileGrid::plan(raster_width, raster_height, tile_size, overlap).map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
        })?;
        Ok(PyTileGrid { inner: grid })
    }

    #[getter]
    fn nb_tiles_x(&self) -> usize {
        self.inner.nb_tiles_x
    }

    #[getter]
    fn nb_tiles_y(&self) -> usize {
        self.inner.nb_tiles_y
    }

    #[getter]
    fn step(&self) -> usize {
        self.inner.step()
    }

    /// `(x, y, col_off, row_off, width, height)` for every tile, row-major
    fn windows(&self) -> Vec<(usize, usize, usize, usize, usize, usize)> {
        self.inner
            .coordinates()
            .into_iter()
            .filter_map(|c| {
                let w = self.inner.window(c)?;
                Some((c.x, c.y, w.col_off, w.row_off, w.width, w.height))
            })
            .collect()
    }

    fn window(&self, x: usize, y: usize) -> PyResult<(usize, usize, usize, usize)> {
        let w = self.inner.window(TileCoordinate::new(x, y)).ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyIndexError, _>(format!(
                "tile {}_{} outside {}x{} grid",
                x, y, self.inner.nb_tiles_x, self.inner.nb_tiles_y
            ))
        })?;
        Ok((w.col_off, w.row_off, w.width, w.height))
    }

    fn __repr__(&self) -> String {
        format!(
            "TileGrid({}x{} tiles, tile={}, overlap={})",
            self.inner.nb_tiles_x, self.inner.nb_tiles_y, self.inner.tile_size, self.inner.overlap
        )
    }
}

/// Fill internal holes of a DSM; returns `(holes, filled)`
#[pyfunction]
#[pyo3(signature = (input, output, internal_no_data=-32767.0, external_no_data=-32768.0, edge_size=None, cpu_count=1))]
fn fill_holes(
    py: Python,
    input: String,
    output: String,
    internal_no_data: f32,
    external_no_data: f32,
    edge_size: Option<usize>,
    cpu_count: usize,
) -> PyResult<(usize, usize)> {
    let params = HoleFillParams {
        internal_no_data,
        external_no_data,
        edge_size,
    };
    let stats = py
        .allow_threads(|| HoleInterpolator::new(params, TilePool::new(cpu_count)).fill_file(&input, &output))
        .map_err(runtime_error)?;
    Ok((stats.holes, stats.filled))
}

/// Run the whole pipeline from a YAML configuration; returns the output path
#[pyfunction]
fn run_pipeline(py: Python, config_path: String) -> PyResult<String> {
    let config = PipelineConfig::from_yaml_file(&config_path).map_err(runtime_error)?;
    let pipeline = Pipeline::new(config).map_err(runtime_error)?;
    let summary = py.allow_threads(|| pipeline.run()).map_err(runtime_error)?;
    Ok(summary.output.to_string_lossy().into_owned())
}
