//! 基準DEMの読み込み

use anyhow::{bail, Context, Result};
use gdal::raster::ResampleAlg;
use gdal::Dataset;
use std::path::Path;

use crate::model::{GridExtent, RasterReference};
use crate::writer::{GridSpec, NODATA_VALUE};

/// 基準DEM
pub struct Dem {
    pub dataset: Dataset,
    pub reference: RasterReference,
}

impl Dem {
    pub fn open(path: &Path) -> Result<Self> {
        let dataset =
            Dataset::open(path).with_context(|| format!("Failed to open DEM {:?}", path))?;
        let reference = read_reference(&dataset)?;
        tracing::info!(
            "DEM {:?}: {} x {} cells of {} at {}",
            path,
            reference.columns,
            reference.rows,
            reference.cell_size,
            reference.extent
        );
        Ok(Self { dataset, reference })
    }

    /// Reads the DEM over `grid`, resampling to the grid cell size with
    /// nearest neighbour. No-data cells come back as `NODATA_VALUE`.
    pub fn read_window(&self, grid: &GridSpec) -> Result<Vec<f64>> {
        let reference = &self.reference;
        let (rows, cols) = grid.shape();

        // DEMセル単位の読み込み窓
        let col_off = ((grid.extent.xmin - reference.extent.xmin) / reference.cell_size).round();
        let row_off = ((reference.extent.ymax - grid.extent.ymax) / reference.cell_size).round();
        let win_cols = (grid.extent.width() / reference.cell_size).round();
        let win_rows = (grid.extent.height() / reference.cell_size).round();

        if col_off < 0.0
            || row_off < 0.0
            || col_off + win_cols > reference.columns as f64
            || row_off + win_rows > reference.rows as f64
        {
            bail!(
                "Extent {} is outside the DEM {}",
                grid.extent,
                reference.extent
            );
        }

        let band = self
            .dataset
            .rasterband(1)
            .context("Failed to get DEM raster band")?;
        let nodata = band.no_data_value();
        let buffer = band
            .read_as::<f64>(
                (col_off as isize, row_off as isize),
                (win_cols as usize, win_rows as usize),
                (cols, rows),
                Some(ResampleAlg::NearestNeighbour),
            )
            .context("Failed to read DEM window")?;

        Ok(buffer
            .data()
            .iter()
            .map(|&v| match nodata {
                Some(nd) if v == nd || (nd.is_nan() && v.is_nan()) => NODATA_VALUE,
                _ => v,
            })
            .collect())
    }
}

/// Bounds, resolution and projection of a north-up raster.
pub fn read_reference(dataset: &Dataset) -> Result<RasterReference> {
    let transform = dataset
        .geo_transform()
        .context("DEM has no geo transform")?;
    if transform[2] != 0.0 || transform[4] != 0.0 {
        bail!("Rotated rasters are not supported");
    }

    let (columns, rows) = dataset.raster_size();
    let xmin = transform[0];
    let ymax = transform[3];
    let extent = GridExtent::new(
        xmin,
        ymax + transform[5] * rows as f64,
        xmin + transform[1] * columns as f64,
        ymax,
    );

    Ok(RasterReference {
        extent,
        cell_size: transform[1],
        columns,
        rows,
        projection: dataset.projection(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::GridWriter;
    use gdal::DriverManager;
    use tempfile::TempDir;

    fn init_gdal() -> bool {
        DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    /// 10x10、セル10mのDEM（値 = 行*10 + 列）
    fn create_dem(path: &Path) {
        let grid = GridSpec {
            extent: GridExtent::new(0.0, 0.0, 100.0, 100.0),
            cell_size: 10.0,
            projection: "",
        };
        let values = (0..100).map(|i| i as f64).collect();
        GridWriter::new().write_values(&grid, values, path).unwrap();
    }

    #[test]
    fn test_read_reference() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dem.tif");
        create_dem(&path);

        let dem = Dem::open(&path).unwrap();
        assert_eq!(dem.reference.extent, GridExtent::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(dem.reference.cell_size, 10.0);
        assert_eq!((dem.reference.columns, dem.reference.rows), (10, 10));
    }

    #[test]
    fn test_read_window() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dem.tif");
        create_dem(&path);
        let dem = Dem::open(&path).unwrap();

        let grid = GridSpec {
            extent: GridExtent::new(10.0, 70.0, 40.0, 90.0),
            cell_size: 10.0,
            projection: "",
        };
        // 1行目(y=90..80)は DEM の行1、列1..3
        let values = dem.read_window(&grid).unwrap();
        assert_eq!(values, vec![11.0, 12.0, 13.0, 21.0, 22.0, 23.0]);

        let outside = GridSpec {
            extent: GridExtent::new(-10.0, 70.0, 40.0, 90.0),
            ..grid
        };
        assert!(dem.read_window(&outside).is_err());
    }
}
