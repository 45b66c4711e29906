use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cell size must be a positive finite number, got {0}")]
    InvalidCellSize(f64),

    #[error("Aligned extent is empty ({columns} x {rows} cells)")]
    EmptyExtent { columns: usize, rows: usize },

    #[error("The output must be saved in a local database (GeoPackage): {0}")]
    NotLocalDatabase(PathBuf),

    #[error("The feature class name is invalid: {0}")]
    InvalidName(String),

    #[error("The feature class already exists: {0}")]
    FeatureClassExists(String),

    #[error("Layer not found: {0}")]
    MissingLayer(String),

    #[error("Field not found on layer: {0}")]
    MissingField(String),

    #[error("Failed to create domain {name}: {reason}")]
    Domain { name: String, reason: String },

    #[error("No ASCII grids (*.asc) found in {0}")]
    NoInputGrids(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
