use anyhow::{Context, Result};
use gdal::raster::{rasterize, Buffer, RasterCreationOptions};
use gdal::vector::Geometry;
use gdal::{Dataset, DriverManager};
use std::path::Path;

use crate::model::GridExtent;

pub const NODATA_VALUE: f64 = -9999.0;

/// 出力グリッドの値の型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridType {
    Integer,
    Float,
}

/// Target grid definition shared by every raster of one run.
#[derive(Debug, Clone)]
pub struct GridSpec<'a> {
    pub extent: GridExtent,
    pub cell_size: f64,
    /// WKT、空文字列なら座標系を設定しない
    pub projection: &'a str,
}

impl GridSpec<'_> {
    pub fn shape(&self) -> (usize, usize) {
        (
            self.extent.rows(self.cell_size),
            self.extent.columns(self.cell_size),
        )
    }
}

#[derive(Default)]
pub struct GridWriter {}

impl GridWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Burns one value per geometry into a new GeoTIFF covering `grid`.
    ///
    /// Cells whose center is not covered by any geometry stay no-data.
    pub fn write_rasterized(
        &self,
        grid: &GridSpec,
        geometries: &[Geometry],
        burn_values: &[f64],
        grid_type: GridType,
        output_path: &Path,
    ) -> Result<()> {
        let mut dataset = self.create(grid, grid_type, output_path)?;

        if !geometries.is_empty() {
            rasterize(&mut dataset, &[1], geometries, burn_values, None)
                .context("Failed to rasterize geometries")?;
        }

        tracing::debug!(
            "Rasterized {} geometries into {:?}",
            geometries.len(),
            output_path
        );
        Ok(())
    }

    /// Writes row-major `values` (no-data already mapped to `NODATA_VALUE`).
    pub fn write_values(&self, grid: &GridSpec, values: Vec<f64>, output_path: &Path) -> Result<()> {
        let (rows, cols) = grid.shape();
        let mut dataset = self.create(grid, GridType::Float, output_path)?;

        let values: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer)
            .context("Failed to write raster data")?;

        Ok(())
    }

    /// GeoTIFF を ESRI ASCII グリッドとして書き出す
    pub fn export_ascii(&self, raster_path: &Path, ascii_path: &Path) -> Result<()> {
        let driver =
            DriverManager::get_driver_by_name("AAIGrid").context("Failed to get AAIGrid driver")?;
        let dataset = Dataset::open(raster_path)
            .with_context(|| format!("Failed to open {:?}", raster_path))?;

        dataset
            .create_copy(&driver, ascii_path, &RasterCreationOptions::new())
            .with_context(|| format!("Failed to export {:?} to ASCII grid", raster_path))?;

        Ok(())
    }

    fn create(&self, grid: &GridSpec, grid_type: GridType, output_path: &Path) -> Result<Dataset> {
        // GTiffドライバーを取得
        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        // データセットを作成
        let (rows, cols) = grid.shape();
        let mut dataset = match grid_type {
            GridType::Integer => driver.create_with_band_type::<i32, _>(output_path, cols, rows, 1),
            GridType::Float => driver.create_with_band_type::<f32, _>(output_path, cols, rows, 1),
        }
        .context("Failed to create dataset")?;

        // ジオトランスフォームを設定
        dataset
            .set_geo_transform(&grid.extent.geo_transform(grid.cell_size))
            .context("Failed to set geo transform")?;

        // 座標系を設定
        if grid.projection.is_empty() {
            tracing::warn!("No spatial reference for {:?}", output_path);
        } else {
            dataset
                .set_projection(grid.projection)
                .context("Failed to set projection")?;
        }

        // NoData値で初期化
        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
        band.set_no_data_value(Some(NODATA_VALUE))
            .context("Failed to set no data value")?;
        band.fill(NODATA_VALUE, None)
            .context("Failed to fill raster band")?;
        drop(band);

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use std::fs;
    use tempfile::TempDir;

    fn drivers_available() -> bool {
        // GTiff/AAIGridドライバーが利用可能かチェック
        DriverManager::get_driver_by_name("GTiff").is_ok()
            && DriverManager::get_driver_by_name("AAIGrid").is_ok()
    }

    fn test_grid(projection: &str) -> GridSpec<'_> {
        GridSpec {
            extent: GridExtent::new(10.0, 10.0, 40.0, 30.0),
            cell_size: 10.0,
            projection,
        }
    }

    #[test]
    fn test_rasterize_and_export() {
        if !drivers_available() {
            eprintln!("Skipping test: GTiff/AAIGrid driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let tif = temp_dir.path().join("blshape.tif");
        let asc = temp_dir.path().join("blshape.asc");

        let wkt = SpatialRef::from_epsg(25833).unwrap().to_wkt().unwrap();
        let grid = test_grid(&wkt);
        // 左2列を覆うポリゴン
        let polygon = Geometry::from_wkt("POLYGON ((10 10, 10 30, 30 30, 30 10, 10 10))").unwrap();

        let writer = GridWriter::new();
        writer
            .write_rasterized(&grid, &[polygon], &[3.0], GridType::Integer, &tif)
            .unwrap();

        let dataset = Dataset::open(&tif).unwrap();
        assert_eq!(dataset.raster_size(), (3, 2));
        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(NODATA_VALUE));
        let buffer = band.read_as::<i32>((0, 0), (3, 2), (3, 2), None).unwrap();
        assert_eq!(buffer.data(), &[3, 3, -9999, 3, 3, -9999]);
        drop(band);
        drop(dataset);

        writer.export_ascii(&tif, &asc).unwrap();
        let text = fs::read_to_string(&asc).unwrap();
        let header: Vec<&str> = text.lines().take(6).collect();
        assert!(header[0].to_lowercase().starts_with("ncols"));
        assert!(header[0].ends_with('3'));
        assert!(header[1].ends_with('2'));
        assert!(text.lines().nth(6).unwrap().trim().starts_with("3 3"));
    }

    #[test]
    fn test_write_values() {
        if !drivers_available() {
            eprintln!("Skipping test: GTiff/AAIGrid driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let tif = temp_dir.path().join("dem.tif");

        let grid = test_grid("");
        let writer = GridWriter::new();
        writer
            .write_values(&grid, vec![1.5, 2.5, 3.5, 4.5, NODATA_VALUE, 6.5], &tif)
            .unwrap();

        let dataset = Dataset::open(&tif).unwrap();
        let transform = dataset.geo_transform().unwrap();
        assert_eq!(transform, [10.0, 10.0, 0.0, 30.0, 0.0, -10.0]);
        let band = dataset.rasterband(1).unwrap();
        let buffer = band.read_as::<f32>((0, 0), (3, 2), (3, 2), None).unwrap();
        assert_eq!(buffer.data()[4], -9999.0);
        assert_eq!(buffer.data()[5], 6.5);
    }
}
