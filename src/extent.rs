//! DEMのセルグリッドに合わせた処理範囲の計算

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::GridExtent;

// 商の丸め誤差として許容するULP数
const SNAP_TOLERANCE_ULPS: f64 = 4.0;

/// Snaps the AOI box onto the DEM cell grid.
///
/// `xmin`/`ymin` step up from the DEM's lower edges and `xmax`/`ymax` step
/// down from its upper edges in whole cells until they lie inside the AOI.
/// Every output bound is `dem_edge ± k * cell_size` with `k >= 0`.
pub fn align_extent(dem: &GridExtent, cell_size: f64, aoi: &GridExtent) -> Result<GridExtent> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(Error::InvalidCellSize(cell_size));
    }

    let xmin = dem.xmin + steps(aoi.xmin - dem.xmin, cell_size) * cell_size;
    let ymin = dem.ymin + steps(aoi.ymin - dem.ymin, cell_size) * cell_size;
    let xmax = dem.xmax - steps(dem.xmax - aoi.xmax, cell_size) * cell_size;
    let ymax = dem.ymax - steps(dem.ymax - aoi.ymax, cell_size) * cell_size;

    // セルより狭いAOIは最小側に幅0で潰す
    let aligned = GridExtent {
        xmin,
        ymin,
        xmax: xmax.max(xmin),
        ymax: ymax.max(ymin),
    };

    debug!("Aligned extent {} to {} (cell size {})", aoi, aligned, cell_size);
    Ok(aligned)
}

/// 距離 `distance` を超えるのに必要なセル数（負なら0）
fn steps(distance: f64, cell_size: f64) -> f64 {
    let cells = distance / cell_size;
    if cells <= 0.0 {
        0.0
    } else {
        (cells - cells.max(1.0) * f64::EPSILON * SNAP_TOLERANCE_ULPS).ceil().max(0.0)
    }
}

/// AOI bounds that stick out of the DEM by more than one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainmentViolation {
    pub aoi: GridExtent,
    pub dem: GridExtent,
    pub cell_size: f64,
}

/// Checks that `aoi` lies inside `dem`, allowing one cell of slack per side.
pub fn check_containment(
    dem: &GridExtent,
    cell_size: f64,
    aoi: &GridExtent,
) -> Option<ContainmentViolation> {
    let outside = aoi.xmin < dem.xmin - cell_size
        || aoi.xmax > dem.xmax + cell_size
        || aoi.ymin < dem.ymin - cell_size
        || aoi.ymax > dem.ymax + cell_size;

    outside.then_some(ContainmentViolation {
        aoi: *aoi,
        dem: *dem,
        cell_size,
    })
}

/// 座標系を比較し、必要なら四隅を個別に投影してから外接矩形を取る
pub fn reconcile_extent(
    extent: &GridExtent,
    source: &SpatialRef,
    target: &SpatialRef,
) -> Result<GridExtent> {
    if source == target {
        return Ok(*extent);
    }
    let corners = project_corners(extent, source, target)?;
    let reconciled = GridExtent::from_corners(corners);
    debug!("Reprojected extent {} to {}", extent, reconciled);
    Ok(reconciled)
}

/// Reprojects the four corners (LL, UL, UR, LR) one by one.
pub fn project_corners(
    extent: &GridExtent,
    source: &SpatialRef,
    target: &SpatialRef,
) -> Result<[(f64, f64); 4]> {
    let source = gis_order(source);
    let target = gis_order(target);
    let transform = CoordTransform::new(&source, &target)?;

    let corners = extent.corners();
    let mut xs: Vec<f64> = corners.iter().map(|c| c.0).collect();
    let mut ys: Vec<f64> = corners.iter().map(|c| c.1).collect();
    let mut zs = vec![0.0; corners.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    Ok([(xs[0], ys[0]), (xs[1], ys[1]), (xs[2], ys[2]), (xs[3], ys[3])])
}

/// x=経度/東距 の軸順に揃えた複製
pub fn gis_order(srs: &SpatialRef) -> SpatialRef {
    let mut srs = srs.clone();
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}
