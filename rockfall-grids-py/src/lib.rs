use pyo3::prelude::*;
use rockfall_grids::extent;
use rockfall_grids::import::DEFAULT_INTEGER_PREFIX;
use rockfall_grids::{
    ExportConfig, FeatureClassRequest, ForestMode, GridExtent, ImportConfig, NormalizeScope,
    OutputFormat, Report, Separators,
};
use std::path::PathBuf;

#[pymodule]
fn rockfall_grids_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyReport>()?;
    m.add_function(wrap_pyfunction!(align_extent, m)?)?;
    m.add_function(wrap_pyfunction!(check_containment, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_text, m)?)?;
    m.add_function(wrap_pyfunction!(convert_to_ascii, m)?)?;
    m.add_function(wrap_pyfunction!(convert_from_ascii, m)?)?;
    m.add_function(wrap_pyfunction!(create_feature_class, m)?)?;
    Ok(())
}

type Bounds = (f64, f64, f64, f64);

fn to_extent(bounds: Bounds) -> GridExtent {
    GridExtent::new(bounds.0, bounds.1, bounds.2, bounds.3)
}

fn io_error(context: &str, e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("{}: {}", context, e))
}

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
}

#[pyclass(name = "Report")]
#[derive(Clone)]
pub struct PyReport {
    #[pyo3(get)]
    pub created: Vec<String>,
    #[pyo3(get)]
    pub skipped: Vec<String>,
    #[pyo3(get)]
    pub warnings: Vec<String>,
}

impl From<Report> for PyReport {
    fn from(report: Report) -> Self {
        let display = |paths: Vec<PathBuf>| paths.iter().map(|p| p.display().to_string()).collect();
        PyReport {
            created: display(report.created),
            skipped: display(report.skipped),
            warnings: report.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

#[pymethods]
impl PyReport {
    fn __repr__(&self) -> String {
        format!(
            "Report(created={}, skipped={}, warnings={})",
            self.created.len(),
            self.skipped.len(),
            self.warnings.len()
        )
    }
}

/// (xmin, ymin, xmax, ymax) をDEMのセルグリッドに合わせる
#[pyfunction]
pub fn align_extent(dem: Bounds, cell_size: f64, aoi: Bounds) -> PyResult<Bounds> {
    let aligned = extent::align_extent(&to_extent(dem), cell_size, &to_extent(aoi))
        .map_err(value_error)?;
    Ok((aligned.xmin, aligned.ymin, aligned.xmax, aligned.ymax))
}

#[pyfunction]
pub fn check_containment(dem: Bounds, cell_size: f64, aoi: Bounds) -> bool {
    extent::check_containment(&to_extent(dem), cell_size, &to_extent(aoi)).is_none()
}

#[pyfunction]
#[pyo3(signature = (text, decimal_separator=".", thousands_separator=""))]
pub fn normalize_text(text: &str, decimal_separator: &str, thousands_separator: &str) -> String {
    let separators = Separators::new(decimal_separator, thousands_separator);
    rockfall_grids::normalize_text(text, &separators).into_owned()
}

#[pyfunction]
#[pyo3(signature = (features, dem, output_dir, cell_size, layer=None, decimal_separator=".", thousands_separator="", row_data_only=false))]
#[allow(clippy::too_many_arguments)]
pub fn convert_to_ascii(
    features: &str,
    dem: &str,
    output_dir: &str,
    cell_size: f64,
    layer: Option<String>,
    decimal_separator: &str,
    thousands_separator: &str,
    row_data_only: bool,
) -> PyResult<PyReport> {
    let config = ExportConfig {
        features: PathBuf::from(features),
        layer,
        dem: PathBuf::from(dem),
        output_dir: PathBuf::from(output_dir),
        cell_size,
        separators: Separators::new(decimal_separator, thousands_separator),
        scope: if row_data_only {
            NormalizeScope::RowData
        } else {
            NormalizeScope::WholeFile
        },
    };
    rockfall_grids::convert_to_ascii(&config)
        .map(PyReport::from)
        .map_err(|e| io_error("Failed to convert to ASCII", e))
}

#[pyfunction]
#[pyo3(signature = (input_dir, destination, format="tiff", srs=None, integer_prefix=DEFAULT_INTEGER_PREFIX))]
pub fn convert_from_ascii(
    input_dir: &str,
    destination: &str,
    format: &str,
    srs: Option<String>,
    integer_prefix: &str,
) -> PyResult<PyReport> {
    let config = ImportConfig {
        input_dir: PathBuf::from(input_dir),
        destination: PathBuf::from(destination),
        format: format.parse::<OutputFormat>().map_err(value_error)?,
        spatial_ref: srs,
        integer_prefix: integer_prefix.to_string(),
    };
    rockfall_grids::convert_from_ascii(&config)
        .map(PyReport::from)
        .map_err(|e| io_error("Failed to convert from ASCII", e))
}

#[pyfunction]
#[pyo3(signature = (geopackage, name, srs, forest="none", dem=None))]
pub fn create_feature_class(
    geopackage: &str,
    name: &str,
    srs: &str,
    forest: &str,
    dem: Option<String>,
) -> PyResult<()> {
    let request = FeatureClassRequest {
        geopackage: PathBuf::from(geopackage),
        name: name.to_string(),
        spatial_ref: srs.to_string(),
        forest: forest.parse::<ForestMode>().map_err(value_error)?,
        dem: dem.map(PathBuf::from),
    };
    rockfall_grids::create_feature_class(&request)
        .map_err(|e| io_error("Failed to create feature class", e))
}
