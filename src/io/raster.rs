use crate::types::{DtmError, DtmResult, GeoTransform, PixelWindow, Raster};
use gdal::raster::{Buffer, GdalType, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Georeferencing and size of a raster on disk, without its samples
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub projection: String,
    pub no_data: Option<f64>,
}

impl RasterInfo {
    /// Dimensions as `(height, width)`, matching ndarray ordering
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Single-band GeoTIFF reader/writer
pub struct RasterIo;

impl RasterIo {
    fn open(path: &Path) -> DtmResult<Dataset> {
        if !path.exists() {
            return Err(DtmError::RasterNotFound(path.to_path_buf()));
        }
        Ok(Dataset::open(path)?)
    }

    /// Read size, transform, CRS and no-data tag of the first band
    pub fn info<P: AsRef<Path>>(path: P) -> DtmResult<RasterInfo> {
        let dataset = Self::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let no_data = dataset.rasterband(1)?.no_data_value();

        Ok(RasterInfo {
            width,
            height,
            transform: GeoTransform::from_gdal(dataset.geo_transform()?),
            projection: dataset.projection(),
            no_data,
        })
    }

    /// Read the whole first band
    pub fn read<T: GdalType + Copy, P: AsRef<Path>>(path: P) -> DtmResult<Raster<T>> {
        let dataset = Self::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        Self::read_from(&dataset, PixelWindow::new(0, 0, width, height))
    }

    /// Read a pixel window of the first band. The returned raster carries the
    /// source transform translated to the window origin.
    pub fn read_window<T: GdalType + Copy, P: AsRef<Path>>(
        path: P,
        window: PixelWindow,
    ) -> DtmResult<Raster<T>> {
        let dataset = Self::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        if window.col_end() > width || window.row_end() > height {
            return Err(DtmError::Geometry(format!(
                "window {:?} exceeds raster {}x{} of {}",
                window,
                width,
                height,
                path.as_ref().display()
            )));
        }
        Self::read_from(&dataset, window)
    }

    fn read_from<T: GdalType + Copy>(dataset: &Dataset, window: PixelWindow) -> DtmResult<Raster<T>> {
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let rasterband = dataset.rasterband(1)?;
        let no_data = rasterband.no_data_value();

        let size = (window.width, window.height);
        let buffer = rasterband.read_as::<T>(
            (window.col_off as isize, window.row_off as isize),
            size,
            size,
            None,
        )?;

        let data = Array2::from_shape_vec((window.height, window.width), buffer.data)
            .map_err(|e| DtmError::Processing(format!("Failed to reshape raster data: {}", e)))?;

        Ok(Raster::new(
            data,
            transform.translated(window.col_off, window.row_off),
            dataset.projection(),
            no_data,
        ))
    }

    /// Write a raster as a single-band LZW-compressed GeoTIFF, replacing any existing file
    pub fn write<T: GdalType + Copy, P: AsRef<Path>>(raster: &Raster<T>, path: P) -> DtmResult<()> {
        let path = path.as_ref();
        let (height, width) = raster.data.dim();
        if width == 0 || height == 0 {
            return Err(DtmError::Processing(format!(
                "refusing to write empty raster to {}",
                path.display()
            )));
        }
        log::debug!("Writing {}x{} raster: {}", width, height, path.display());

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let options = [RasterCreationOption { key: "COMPRESS", value: "LZW" }];
        let mut dataset = driver.create_with_band_type_with_options::<T, _>(
            path,
            width as isize,
            height as isize,
            1,
            &options,
        )?;

        dataset.set_geo_transform(&raster.transform.to_gdal())?;
        if !raster.projection.is_empty() {
            dataset.set_projection(&raster.projection)?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<T> = raster.data.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(no_data) = raster.no_data {
            rasterband.set_no_data_value(Some(no_data))?;
        }

        Ok(())
    }
}

/// Verify that two rasters share size, transform and CRS
pub fn check_compatibility<P: AsRef<Path>, Q: AsRef<Path>>(reference: P, other: Q) -> DtmResult<()> {
    let a = RasterIo::info(&reference)?;
    let b = RasterIo::info(&other)?;
    let context = format!(
        "{} vs {}",
        reference.as_ref().display(),
        other.as_ref().display()
    );

    if a.shape() != b.shape() {
        log::error!("❌ Incompatible rasters: {}", context);
        return Err(DtmError::ShapeMismatch {
            context,
            expected: a.shape(),
            found: b.shape(),
        });
    }
    if a.transform != b.transform {
        return Err(DtmError::Geometry(format!(
            "geotransform differs ({}): {:?} vs {:?}",
            context, a.transform, b.transform
        )));
    }
    if a.projection != b.projection {
        return Err(DtmError::Geometry(format!("CRS differs ({})", context)));
    }

    log::info!("✅ Compatible rasters: {}x{}", a.width, a.height);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_raster() -> Raster<f32> {
        let data = Array2::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as f32);
        Raster::new(data, GeoTransform::north_up(500.0, 900.0, 2.0), String::new(), Some(-32768.0))
    }

    #[test]
    fn test_write_then_read_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.tif");
        RasterIo::write(&sample_raster(), &path).unwrap();

        let window = RasterIo::read_window::<f32, _>(&path, PixelWindow::new(2, 1, 3, 2)).unwrap();
        assert_eq!(window.data.dim(), (2, 3));
        assert_eq!(window.data[[0, 0]], 12.0);
        assert_eq!(window.data[[1, 2]], 24.0);
        assert_eq!(window.transform.top_left_x, 504.0);
        assert_eq!(window.transform.top_left_y, 898.0);
        assert_eq!(window.no_data, Some(-32768.0));
    }

    #[test]
    fn test_missing_raster_is_io_error() {
        let err = RasterIo::read::<f32, _>("/nonexistent/dsm.tif").unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_window_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.tif");
        RasterIo::write(&sample_raster(), &path).unwrap();

        let err = RasterIo::read_window::<f32, _>(&path, PixelWindow::new(4, 0, 3, 2)).unwrap_err();
        assert!(matches!(err, DtmError::Geometry(_)));
    }

    #[test]
    fn test_compatibility_detects_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.tif");
        let b = dir.path().join("b.tif");
        let raster = sample_raster();
        RasterIo::write(&raster, &a).unwrap();
        RasterIo::write(&raster.with_data(Array2::<u8>::zeros((3, 6))), &b).unwrap();

        assert!(check_compatibility(&a, &a).is_ok());
        assert!(matches!(
            check_compatibility(&a, &b),
            Err(DtmError::ShapeMismatch { .. })
        ));
    }
}
