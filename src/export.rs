//! ポリゴンレイヤーと DEM から RockyFor3D 用 ASCII グリッドを作成する

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::aoi::AoiLayer;
use crate::artifact::{produce_once, remove_intermediates, ArtifactPaths};
use crate::dem::Dem;
use crate::error::Error;
use crate::extent::{align_extent, check_containment, reconcile_extent};
use crate::model::{attribute_field_list, AttributeSpec};
use crate::normalize::{normalize_file, NormalizeScope, Separators};
use crate::report::{Report, RunWarning};
use crate::validate::is_cell_size_choice;
use crate::writer::{GridSpec, GridWriter};

/// DEMグリッドの出力名
pub const DEM_GRID_NAME: &str = "dem";

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// 属性ポリゴンのデータセット
    pub features: PathBuf,
    /// None なら最初のレイヤー
    pub layer: Option<String>,
    pub dem: PathBuf,
    pub output_dir: PathBuf,
    pub cell_size: f64,
    pub separators: Separators,
    pub scope: NormalizeScope,
}

/// Writes one ASCII grid per attribute plus `dem.asc` into the output
/// directory. Grids that already exist are skipped, never overwritten.
pub fn convert_to_ascii(config: &ExportConfig) -> Result<Report> {
    let mut report = Report::default();

    if !(config.cell_size.is_finite() && config.cell_size > 0.0) {
        return Err(Error::InvalidCellSize(config.cell_size).into());
    }

    let dem = Dem::open(&config.dem)?;
    let reference = &dem.reference;
    if !is_cell_size_choice(config.cell_size, reference.cell_size) {
        report.warn(RunWarning::CellSizeNotMultiple {
            cell_size: config.cell_size,
            native: reference.cell_size,
        });
    }

    let mut aoi = AoiLayer::read(&config.features, config.layer.as_deref())
        .with_context(|| format!("Failed to read polygons from {:?}", config.features))?;
    let Some(aoi_extent) = aoi.extent() else {
        bail!("Layer '{}' has no polygons", aoi.name);
    };
    let attributes = attribute_field_list(&aoi.field_names());
    aoi.require(&attributes)?;

    // 座標系の整合
    let dem_srs = dem.dataset.spatial_ref().ok();
    let aoi_extent = match (aoi.spatial_ref.clone(), &dem_srs) {
        (Some(source), Some(target)) => {
            let reconciled = reconcile_extent(&aoi_extent, &source, target)?;
            aoi.project_to(target)?;
            reconciled
        }
        _ => {
            tracing::warn!("Missing spatial reference, assuming the polygons use the DEM's");
            aoi_extent
        }
    };

    if let Some(violation) = check_containment(&reference.extent, config.cell_size, &aoi_extent) {
        report.warn(RunWarning::Containment(violation));
    }

    let extent = align_extent(&reference.extent, config.cell_size, &aoi_extent)?;
    let grid = GridSpec {
        extent,
        cell_size: config.cell_size,
        projection: &reference.projection,
    };
    let (rows, columns) = grid.shape();
    if rows == 0 || columns == 0 {
        return Err(Error::EmptyExtent { columns, rows }.into());
    }
    info!("Grid extent {} ({} x {} cells)", extent, columns, rows);

    // 前提条件の確認が済んでから出力先を作る
    fs::create_dir_all(&config.output_dir)?;
    let writer = GridWriter::new();

    for attribute in &attributes {
        let paths = ArtifactPaths::new(&config.output_dir, attribute.name);
        let created = produce_once(&paths, &mut report, |paths| {
            write_attribute(&writer, &aoi, attribute, &grid, paths)?;
            finish(&writer, paths, config)
        })?;
        if created {
            remove_intermediates(&paths, &mut report);
        }
    }

    let paths = ArtifactPaths::new(&config.output_dir, DEM_GRID_NAME);
    let created = produce_once(&paths, &mut report, |paths| {
        let values = dem.read_window(&grid)?;
        writer.write_values(&grid, values, &paths.raster)?;
        finish(&writer, paths, config)
    })?;
    if created {
        remove_intermediates(&paths, &mut report);
    }

    info!(
        "Created {} grids, skipped {}, {} warnings",
        report.created.len(),
        report.skipped.len(),
        report.warnings.len()
    );
    Ok(report)
}

fn write_attribute(
    writer: &GridWriter,
    aoi: &AoiLayer,
    attribute: &AttributeSpec,
    grid: &GridSpec,
    paths: &ArtifactPaths,
) -> Result<()> {
    let grid_type = aoi.grid_type(attribute)?;
    let (geometries, burn_values) = aoi.burn_inputs(attribute)?;
    writer.write_rasterized(grid, &geometries, &burn_values, grid_type, &paths.raster)
}

/// ASCII 出力と区切り文字の正規化
fn finish(writer: &GridWriter, paths: &ArtifactPaths, config: &ExportConfig) -> Result<()> {
    writer.export_ascii(&paths.raster, &paths.ascii)?;
    normalize_file(&paths.ascii, &config.separators, config.scope)?;
    info!("Written ASCII grid: {:?}", paths.ascii);
    Ok(())
}
