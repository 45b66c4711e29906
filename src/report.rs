use std::fmt;
use std::path::PathBuf;

use crate::extent::ContainmentViolation;

/// 実行を止めない警告
#[derive(Debug, Clone, PartialEq)]
pub enum RunWarning {
    Containment(ContainmentViolation),
    AlreadyExists(PathBuf),
    CleanupFailed { path: PathBuf, reason: String },
    CellSizeNotMultiple { cell_size: f64, native: f64 },
    IntegerOutOfRange { grid: PathBuf, min: f64, max: f64 },
}

impl RunWarning {
    /// `tracing::warn!` で出力する
    pub fn emit(&self) {
        tracing::warn!("{}", self);
    }
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::Containment(v) => write!(
                f,
                "The polygon layer should be completely contained by the DEM \
                 (fc_xmin={}, dem_xmin={}; fc_xmax={}, dem_xmax={}; \
                 fc_ymin={}, dem_ymin={}; fc_ymax={}, dem_ymax={})",
                v.aoi.xmin, v.dem.xmin, v.aoi.xmax, v.dem.xmax, v.aoi.ymin, v.dem.ymin, v.aoi.ymax, v.dem.ymax
            ),
            RunWarning::AlreadyExists(path) => write!(
                f,
                "{} already exists and cannot be overwritten",
                path.display()
            ),
            RunWarning::CleanupFailed { path, reason } => {
                write!(f, "{} could not be deleted: {}", path.display(), reason)
            }
            RunWarning::CellSizeNotMultiple { cell_size, native } => write!(
                f,
                "Cell size {} is not a multiple (1-10x) of the DEM resolution {}",
                cell_size, native
            ),
            RunWarning::IntegerOutOfRange { grid, min, max } => write!(
                f,
                "{} has values {}..{} outside the 16-bit integer range, stored as Float32",
                grid.display(),
                min,
                max
            ),
        }
    }
}

/// Outcome of one conversion run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// 作成した成果物
    pub created: Vec<PathBuf>,
    /// 既存のためスキップした成果物
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<RunWarning>,
}

impl Report {
    /// Logs and records a warning.
    pub fn warn(&mut self, warning: RunWarning) {
        warning.emit();
        self.warnings.push(warning);
    }

    pub fn already_exists(&self) -> impl Iterator<Item = &PathBuf> {
        self.warnings.iter().filter_map(|w| match w {
            RunWarning::AlreadyExists(path) => Some(path),
            _ => None,
        })
    }
}
