//! 成果物の存在チェックと中間ファイルの削除

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::report::{Report, RunWarning};

/// Paths produced for one grid: the GeoTIFF intermediate and the text grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raster: PathBuf,
    pub ascii: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, name: &str) -> Self {
        Self {
            raster: output_dir.join(format!("{}.tif", name)),
            ascii: output_dir.join(format!("{}.asc", name)),
        }
    }

    /// 既に存在する成果物（ラスタを優先）
    pub fn existing(&self) -> Option<&Path> {
        [&self.raster, &self.ascii]
            .into_iter()
            .find(|path| path.exists())
            .map(PathBuf::as_path)
    }

    /// Sidecar files GDAL may leave next to the outputs.
    fn sidecars(&self) -> Vec<PathBuf> {
        vec![
            with_suffix(&self.ascii, ".aux.xml"),
            with_suffix(&self.raster, ".aux.xml"),
        ]
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Runs `produce` unless one of the artifacts already exists.
///
/// An existing artifact is recorded as skipped with an `AlreadyExists`
/// warning and nothing is written. Returns whether `produce` ran.
pub fn produce_once<F>(paths: &ArtifactPaths, report: &mut Report, produce: F) -> anyhow::Result<bool>
where
    F: FnOnce(&ArtifactPaths) -> anyhow::Result<()>,
{
    if let Some(existing) = paths.existing() {
        let existing = existing.to_path_buf();
        report.skipped.push(existing.clone());
        report.warn(RunWarning::AlreadyExists(existing));
        return Ok(false);
    }

    produce(paths)?;
    report.created.push(paths.ascii.clone());
    Ok(true)
}

/// Removes the GeoTIFF intermediate and GDAL sidecars.
///
/// Failures never abort the run; they become `CleanupFailed` warnings.
pub fn remove_intermediates(paths: &ArtifactPaths, report: &mut Report) {
    if let Err(e) = remove_if_exists(&paths.raster) {
        report.warn(RunWarning::CleanupFailed {
            path: paths.raster.clone(),
            reason: e.to_string(),
        });
    }
    for sidecar in paths.sidecars() {
        if let Err(e) = remove_if_exists(&sidecar) {
            report.warn(RunWarning::CleanupFailed {
                path: sidecar,
                reason: e.to_string(),
            });
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
