//! ASCIIグリッド（RockyFor3Dの出力）を他のラスタ形式に変換する

use anyhow::{Context, Result};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::sql::Dialect;
use gdal::vector::LayerAccess;
use gdal::{Dataset, DriverManager};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::Error;
use crate::report::{Report, RunWarning};
use crate::validate::is_local_database;
use crate::writer::{GridType, NODATA_VALUE};

/// 整数グリッドを示すファイル名の接頭辞
pub const DEFAULT_INTEGER_PREFIX: &str = "Nr_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Tiff,
    CloudOptimized,
    ErdasImagine,
    EsriGrid,
}

impl OutputFormat {
    pub fn driver(&self) -> &'static str {
        match self {
            OutputFormat::Tiff => "GTiff",
            OutputFormat::CloudOptimized => "COG",
            OutputFormat::ErdasImagine => "HFA",
            OutputFormat::EsriGrid => "EHdr",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tiff | OutputFormat::CloudOptimized => ".tif",
            OutputFormat::ErdasImagine => ".img",
            OutputFormat::EsriGrid => ".bil",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "tiff" | "tif" | "gtiff" => Ok(OutputFormat::Tiff),
            "cloud-optimized" | "cog" | "crf" => Ok(OutputFormat::CloudOptimized),
            "erdas-imagine" | "img" | "hfa" => Ok(OutputFormat::ErdasImagine),
            "esri-grid" | "ehdr" | "bil" => Ok(OutputFormat::EsriGrid),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver())
    }
}

/// 出力先（フォルダまたはGeoPackage）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Folder(PathBuf),
    Database(PathBuf),
}

impl Destination {
    pub fn of(path: &Path) -> Self {
        if is_local_database(path) {
            Destination::Database(path.to_path_buf())
        } else {
            Destination::Folder(path.to_path_buf())
        }
    }

    /// Output name for an input grid. Databases take the bare stem.
    pub fn output_name(&self, grid: &Path, format: OutputFormat) -> String {
        let stem = grid
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self {
            Destination::Database(_) => stem,
            Destination::Folder(_) => format!("{}{}", stem, format.extension()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub input_dir: PathBuf,
    pub destination: PathBuf,
    /// データベース出力では無視される
    pub format: OutputFormat,
    /// EPSGコード、WKT、PROJ文字列
    pub spatial_ref: Option<String>,
    pub integer_prefix: String,
}

/// Grid value type picked from the file name.
pub fn grid_type_for(grid: &Path, integer_prefix: &str) -> GridType {
    let name = grid
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    if !integer_prefix.is_empty() && name.starts_with(integer_prefix) {
        GridType::Integer
    } else {
        GridType::Float
    }
}

/// `*.asc` files of `dir` (extension case-insensitive), sorted by name.
pub fn list_ascii_grids(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut grids: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("asc"))
        })
        .collect();
    grids.sort();
    Ok(grids)
}

/// Converts every ASCII grid of the input folder. Existing outputs are
/// skipped with a warning.
pub fn convert_from_ascii(config: &ImportConfig) -> Result<Report> {
    let grids = list_ascii_grids(&config.input_dir)?;
    if grids.is_empty() {
        return Err(Error::NoInputGrids(config.input_dir.clone()).into());
    }

    let destination = Destination::of(&config.destination);
    let assigned = config
        .spatial_ref
        .as_deref()
        .map(SpatialRef::from_definition)
        .transpose()
        .context("Invalid spatial reference")?;

    match &destination {
        Destination::Folder(dir) => fs::create_dir_all(dir)?,
        Destination::Database(_) => info!("Database destination, writing GeoPackage rasters"),
    }

    let mut report = Report::default();
    for grid in &grids {
        let name = destination.output_name(grid, config.format);
        let grid_type = grid_type_for(grid, &config.integer_prefix);

        let target = match &destination {
            Destination::Folder(dir) => dir.join(&name),
            Destination::Database(gpkg) => PathBuf::from(format!("GPKG:{}:{}", gpkg.display(), name)),
        };
        if output_exists(&destination, &name)? {
            report.skipped.push(target.clone());
            report.warn(RunWarning::AlreadyExists(target));
            continue;
        }

        let memory = load_grid(grid, grid_type, &destination, assigned.as_ref(), &mut report)?;
        write_output(&memory, &destination, &name, config.format)
            .with_context(|| format!("Failed to convert {:?}", grid))?;

        info!("Written {:?}", target);
        report.created.push(target);
    }

    Ok(report)
}

fn output_exists(destination: &Destination, name: &str) -> Result<bool> {
    match destination {
        Destination::Folder(dir) => Ok(dir.join(name).exists()),
        Destination::Database(gpkg) => {
            if !gpkg.exists() {
                return Ok(false);
            }
            let dataset = Dataset::open(gpkg)?;
            let sql = format!(
                "SELECT table_name FROM gpkg_contents WHERE lower(table_name) = lower('{}')",
                name.replace('\'', "''")
            );
            let found = dataset
                .execute_sql(sql, None, Dialect::DEFAULT)?
                .is_some_and(|rows| rows.feature_count() > 0);
            Ok(found)
        }
    }
}

/// ASCIIグリッドをメモリ上のデータセットに読み込む
fn load_grid(
    grid: &Path,
    grid_type: GridType,
    destination: &Destination,
    assigned: Option<&SpatialRef>,
    report: &mut Report,
) -> Result<Dataset> {
    let source = Dataset::open(grid).with_context(|| format!("Failed to open {:?}", grid))?;
    let (cols, rows) = source.raster_size();
    let band = source.rasterband(1).context("Failed to get raster band")?;
    let nodata = band.no_data_value().unwrap_or(NODATA_VALUE);
    let values = band
        .read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)
        .context("Failed to read ASCII grid")?;
    let values = values.data();

    // GeoPackageの整数ラスタは16bitまで、収まらなければ実数で保存
    let grid_type = match (grid_type, destination) {
        (GridType::Integer, Destination::Database(_)) => match int16_overflow(values, nodata) {
            Some((min, max)) => {
                report.warn(RunWarning::IntegerOutOfRange {
                    grid: grid.to_path_buf(),
                    min,
                    max,
                });
                GridType::Float
            }
            None => GridType::Integer,
        },
        _ => grid_type,
    };

    let driver = DriverManager::get_driver_by_name("MEM").context("Failed to get MEM driver")?;
    let mut memory = match (grid_type, destination) {
        (GridType::Integer, Destination::Database(_)) => {
            let mut ds = driver.create_with_band_type::<i16, _>("", cols, rows, 1)?;
            write_band(&mut ds, cols, rows, values.iter().map(|&v| v.round() as i16).collect())?;
            ds
        }
        (GridType::Integer, Destination::Folder(_)) => {
            let mut ds = driver.create_with_band_type::<i32, _>("", cols, rows, 1)?;
            write_band(&mut ds, cols, rows, values.iter().map(|&v| v.round() as i32).collect())?;
            ds
        }
        (GridType::Float, _) => {
            let mut ds = driver.create_with_band_type::<f32, _>("", cols, rows, 1)?;
            write_band(&mut ds, cols, rows, values.iter().map(|&v| v as f32).collect())?;
            ds
        }
    };

    memory.set_geo_transform(&source.geo_transform()?)?;
    match assigned {
        Some(srs) => memory.set_spatial_ref(srs)?,
        None => {
            let projection = source.projection();
            if !projection.is_empty() {
                memory.set_projection(&projection)?;
            }
        }
    }
    memory
        .rasterband(1)?
        .set_no_data_value(Some(nodata))
        .context("Failed to set no data value")?;

    Ok(memory)
}

/// Value range of the data cells when it does not fit in Int16.
pub fn int16_overflow(values: &[f64], nodata: f64) -> Option<(f64, f64)> {
    let (min, max) = values
        .iter()
        .filter(|&&v| v != nodata && !v.is_nan())
        .map(|v| v.round())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let fits = min >= i16::MIN as f64 && max <= i16::MAX as f64;
    (min <= max && !fits).then_some((min, max))
}

fn write_band<T: GdalType + Copy>(
    dataset: &mut Dataset,
    cols: usize,
    rows: usize,
    values: Vec<T>,
) -> Result<()> {
    let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
    let mut buffer = Buffer::new((cols, rows), values);
    band.write((0, 0), (cols, rows), &mut buffer)
        .context("Failed to write raster data")?;
    Ok(())
}

fn write_output(
    memory: &Dataset,
    destination: &Destination,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let mut options = CslStringList::new();
    let (driver_name, path) = match destination {
        Destination::Folder(dir) => (format.driver(), dir.join(name)),
        Destination::Database(gpkg) => {
            options.set_name_value("RASTER_TABLE", name)?;
            if gpkg.exists() {
                options.set_name_value("APPEND_SUBDATASET", "YES")?;
            }
            ("GPKG", gpkg.clone())
        }
    };

    let driver = DriverManager::get_driver_by_name(driver_name)
        .with_context(|| format!("Failed to get {} driver", driver_name))?;
    memory.create_copy(&driver, &path, &options)?;
    Ok(())
}
