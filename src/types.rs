use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Elevation samples (DSM, initialization, solved DTM)
pub type Elevation = f32;

/// Classification mask samples
pub type MaskLabel = u8;

/// 2D elevation array (rows x columns)
pub type ElevationGrid = Array2<Elevation>;

/// Mask label for ground pixels, as expected by the terrain solver
pub const GROUND_LABEL: MaskLabel = 0;

/// Mask label for above-ground pixels, as expected by the terrain solver
pub const ABOVE_GROUND_LABEL: MaskLabel = 255;

/// Affine pixel-to-map transformation (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Transform of a sub-window whose origin is pixel (col, row) of this grid
    pub fn translated(&self, col: usize, row: usize) -> Self {
        let (x, y) = self.pixel_to_map(col as f64, row as f64);
        Self {
            top_left_x: x,
            top_left_y: y,
            ..*self
        }
    }

    /// Map-space bounds of a `width` x `height` raster with this transform.
    /// Only valid for rotation-free grids.
    pub fn bounds(&self, width: usize, height: usize) -> MapBounds {
        let (x0, y0) = self.pixel_to_map(0.0, 0.0);
        let (x1, y1) = self.pixel_to_map(width as f64, height as f64);
        MapBounds {
            left: x0.min(x1),
            right: x0.max(x1),
            bottom: y0.min(y1),
            top: y0.max(y1),
        }
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation_x != 0.0 || self.rotation_y != 0.0
    }
}

/// Axis-aligned map-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl MapBounds {
    /// Raw intersection; extents may come out negative when the inputs are disjoint
    pub fn intersection(&self, other: &MapBounds) -> MapBounds {
        MapBounds {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Rectangular pixel window inside a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self { col_off, row_off, width, height }
    }

    pub fn col_end(&self) -> usize {
        self.col_off + self.width
    }

    pub fn row_end(&self) -> usize {
        self.row_off + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Single-band georeferenced raster held in memory
#[derive(Debug, Clone)]
pub struct Raster<T> {
    /// Samples, indexed `[[row, col]]`
    pub data: Array2<T>,
    pub transform: GeoTransform,
    /// CRS as WKT; empty when the source carries none
    pub projection: String,
    pub no_data: Option<f64>,
}

impl<T> Raster<T> {
    pub fn new(data: Array2<T>, transform: GeoTransform, projection: String, no_data: Option<f64>) -> Self {
        Self { data, transform, projection, no_data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn bounds(&self) -> MapBounds {
        self.transform.bounds(self.width(), self.height())
    }

    /// Same georeferencing, different samples
    pub fn with_data<U>(&self, data: Array2<U>) -> Raster<U> {
        Raster {
            data,
            transform: self.transform,
            projection: self.projection.clone(),
            no_data: self.no_data,
        }
    }
}

/// The three no-data sentinels used across a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoDataSentinels {
    /// Outside the surveyed extent
    pub external: f32,
    /// Correlation failures inside the extent (hole-filled)
    pub internal: f32,
    /// Mask value for pixels coincident with external no-data
    pub mask_internal: MaskLabel,
}

impl Default for NoDataSentinels {
    fn default() -> Self {
        Self {
            external: -32768.0,
            internal: -32767.0,
            mask_internal: 11,
        }
    }
}

impl NoDataSentinels {
    /// Checks that no two sentinels collide and that the mask sentinel is not a solver label
    pub fn validate(&self) -> DtmResult<()> {
        if !self.external.is_finite() || !self.internal.is_finite() {
            return Err(DtmError::Config("no-data sentinels must be finite".to_string()));
        }
        if self.external == self.internal {
            return Err(DtmError::Config(format!(
                "external and internal no-data must differ (both {})",
                self.external
            )));
        }
        let mask = self.mask_internal;
        if mask == GROUND_LABEL || mask == ABOVE_GROUND_LABEL {
            return Err(DtmError::Config(format!(
                "mask-internal no-data {} collides with a solver mask label",
                mask
            )));
        }
        let mask_value = f32::from(mask);
        if mask_value == self.external || mask_value == self.internal {
            return Err(DtmError::Config(format!(
                "mask-internal no-data {} collides with an elevation sentinel",
                mask
            )));
        }
        Ok(())
    }
}

/// Error types for terrain tiling
#[derive(Debug, thiserror::Error)]
pub enum DtmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Raster not found: {}", .0.display())]
    RasterNotFound(PathBuf),

    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Missing solved tile {x}_{y}: {}", .path.display())]
    MissingTile { x: usize, y: usize, path: PathBuf },

    #[error("Solver failed on tile {x}_{y} with exit code {code}")]
    SolverExit { x: usize, y: usize, code: i32 },

    #[error("{} tile(s) failed", .0.len())]
    TileFailures(Vec<TileFailure>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Processing error: {0}")]
    Processing(String),
}

impl DtmError {
    /// Raster unreadable or unwritable
    pub fn is_io(&self) -> bool {
        matches!(self, DtmError::Io(_) | DtmError::Gdal(_) | DtmError::RasterNotFound(_))
    }
}

/// One tile that could not be extracted or solved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    pub x: usize,
    pub y: usize,
    /// Solver exit code, when the solver ran and failed
    pub exit_code: Option<i32>,
    pub message: String,
}

impl TileFailure {
    pub fn new(x: usize, y: usize, error: &DtmError) -> Self {
        let exit_code = match error {
            DtmError::SolverExit { code, .. } => Some(*code),
            _ => None,
        };
        Self {
            x,
            y,
            exit_code,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for TileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {}_{}: {}", self.x, self.y, self.message)
    }
}

/// Result type for terrain tiling operations
pub type DtmResult<T> = Result<T, DtmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translated_transform() {
        let gt = GeoTransform::north_up(1000.0, 5000.0, 0.5);
        let tile = gt.translated(180, 360);
        assert_eq!(tile.top_left_x, 1090.0);
        assert_eq!(tile.top_left_y, 4820.0);
        assert_eq!(tile.pixel_width, 0.5);
        assert_eq!(tile.pixel_height, -0.5);
    }

    #[test]
    fn test_bounds_and_intersection() {
        let gt = GeoTransform::north_up(0.0, 100.0, 1.0);
        let a = gt.bounds(30, 20);
        assert_eq!(a, MapBounds { left: 0.0, bottom: 80.0, right: 30.0, top: 100.0 });

        let b = gt.translated(20, 0).bounds(30, 20);
        let overlap = a.intersection(&b);
        assert_eq!(overlap.width(), 10.0);
        assert_eq!(overlap.height(), 20.0);
    }

    #[test]
    fn test_sentinel_validation() {
        assert!(NoDataSentinels::default().validate().is_ok());

        let same = NoDataSentinels { external: -1.0, internal: -1.0, mask_internal: 11 };
        assert!(matches!(same.validate(), Err(DtmError::Config(_))));

        let label = NoDataSentinels { mask_internal: 255, ..Default::default() };
        assert!(label.validate().is_err());

        let mask_clash = NoDataSentinels { external: 11.0, internal: -1.0, mask_internal: 11 };
        assert!(mask_clash.validate().is_err());
    }
}
