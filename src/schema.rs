//! RockyFor3D 用フィーチャクラス（GeoPackage レイヤー）の作成

use anyhow::{Context, Result};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, Layer, LayerAccess, LayerOptions, OGRwkbGeometryType};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use gdal_sys::{OGRCodedValue, OGRErr, OGRFieldSubType, OGRFieldType};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::info;

use crate::dem::Dem;
use crate::error::Error;
use crate::extent::project_corners;
use crate::model::{AttributeSpec, CodedDomain, FieldKind, ForestMode, DOMAINS};
use crate::validate::feature_class_destination;

#[derive(Debug, Clone)]
pub struct FeatureClassRequest {
    pub geopackage: PathBuf,
    pub name: String,
    /// 出力座標系（EPSGコード、WKT、PROJ文字列）
    pub spatial_ref: String,
    pub forest: ForestMode,
    /// 指定するとDEMの範囲を覆うポリゴンを1つ作成する
    pub dem: Option<PathBuf>,
}

/// Creates the polygon layer with the simulator attributes and their
/// coded domains inside a GeoPackage.
pub fn create_feature_class(request: &FeatureClassRequest) -> Result<()> {
    feature_class_destination(&request.geopackage, &request.name)?;
    let spatial_ref = SpatialRef::from_definition(&request.spatial_ref)
        .with_context(|| format!("Invalid spatial reference: {}", request.spatial_ref))?;

    let mut dataset = open_or_create(&request.geopackage)?;

    for domain in &DOMAINS {
        if has_domain(&dataset, domain.name)? {
            info!("Domain {} already exists", domain.name);
        } else {
            add_domain(&dataset, domain)?;
            info!("Created domain {}", domain.name);
        }
    }

    // 矩形ポリゴンはレイヤー作成前に計算しておく
    let seed = match &request.dem {
        Some(dem) => Some(dem_polygon(dem, &spatial_ref)?),
        None => None,
    };

    let mut layer = dataset
        .create_layer(LayerOptions {
            name: &request.name,
            srs: Some(&spatial_ref),
            ty: OGRwkbGeometryType::wkbPolygon,
            options: None,
        })
        .with_context(|| format!("Failed to create layer {}", request.name))?;

    for attribute in request.forest.attributes() {
        add_field(&layer, &attribute)?;
    }

    if let Some(polygon) = seed {
        layer
            .create_feature(polygon)
            .context("Failed to insert DEM polygon")?;
    }

    info!(
        "Created feature class {} in {:?}",
        request.name, request.geopackage
    );
    Ok(())
}

fn open_or_create(path: &Path) -> Result<Dataset> {
    if path.exists() {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_VECTOR,
            ..Default::default()
        };
        Dataset::open_ex(path, options).with_context(|| format!("Failed to open {:?}", path))
    } else {
        let driver =
            DriverManager::get_driver_by_name("GPKG").context("Failed to get GPKG driver")?;
        driver
            .create_vector_only(path)
            .with_context(|| format!("Failed to create {:?}", path))
    }
}

pub fn has_domain(dataset: &Dataset, name: &str) -> Result<bool> {
    let c_name = CString::new(name)?;
    let domain = unsafe { gdal_sys::GDALDatasetGetFieldDomain(dataset.c_dataset(), c_name.as_ptr()) };
    Ok(!domain.is_null())
}

fn add_domain(dataset: &Dataset, domain: &CodedDomain) -> Result<()> {
    let c_name = CString::new(domain.name)?;
    let c_description = CString::new("")?;
    let codes = domain
        .codes
        .iter()
        .map(|(code, value)| Ok((CString::new(code.to_string())?, CString::new(*value)?)))
        .collect::<Result<Vec<_>>>()?;

    // 末尾はNULL終端
    let mut enumeration: Vec<OGRCodedValue> = codes
        .iter()
        .map(|(code, value)| OGRCodedValue {
            pszCode: code.as_ptr() as *mut c_char,
            pszValue: value.as_ptr() as *mut c_char,
        })
        .collect();
    enumeration.push(OGRCodedValue {
        pszCode: ptr::null_mut(),
        pszValue: ptr::null_mut(),
    });

    unsafe {
        let c_domain = gdal_sys::OGR_CodedFldDomain_Create(
            c_name.as_ptr(),
            c_description.as_ptr(),
            OGRFieldType::OFTInteger,
            OGRFieldSubType::OFSTInt16,
            enumeration.as_ptr(),
        );
        if c_domain.is_null() {
            return Err(Error::Domain {
                name: domain.name.to_string(),
                reason: "invalid coded values".to_string(),
            }
            .into());
        }

        let mut reason: *mut c_char = ptr::null_mut();
        let added = gdal_sys::GDALDatasetAddFieldDomain(dataset.c_dataset(), c_domain, &mut reason);
        gdal_sys::OGR_FldDomain_Destroy(c_domain);

        if !added {
            let reason_text = if reason.is_null() {
                "not supported by the driver".to_string()
            } else {
                let text = CStr::from_ptr(reason).to_string_lossy().into_owned();
                gdal_sys::VSIFree(reason.cast());
                text
            };
            return Err(Error::Domain {
                name: domain.name.to_string(),
                reason: reason_text,
            }
            .into());
        }
    }
    Ok(())
}

/// 別名・ドメイン・既定値付きでフィールドを追加する
fn add_field(layer: &Layer, attribute: &AttributeSpec) -> Result<()> {
    let c_name = CString::new(attribute.name)?;
    let c_alias = CString::new(attribute.alias)?;
    let c_domain = attribute.domain.map(CString::new).transpose()?;
    let c_default = attribute.default.map(CString::new).transpose()?;

    unsafe {
        let field = match attribute.kind {
            FieldKind::Short => {
                let field = gdal_sys::OGR_Fld_Create(c_name.as_ptr(), OGRFieldType::OFTInteger);
                gdal_sys::OGR_Fld_SetSubType(field, OGRFieldSubType::OFSTInt16);
                field
            }
            FieldKind::Double => gdal_sys::OGR_Fld_Create(c_name.as_ptr(), OGRFieldType::OFTReal),
        };
        gdal_sys::OGR_Fld_SetAlternativeName(field, c_alias.as_ptr());
        if let Some(domain) = &c_domain {
            gdal_sys::OGR_Fld_SetDomainName(field, domain.as_ptr());
        }
        if let Some(default) = &c_default {
            gdal_sys::OGR_Fld_SetDefault(field, default.as_ptr());
        }

        let err = gdal_sys::OGR_L_CreateField(layer.c_layer(), field, 1);
        gdal_sys::OGR_Fld_Destroy(field);
        if err != OGRErr::OGRERR_NONE {
            anyhow::bail!("Failed to create field {} (OGRErr {})", attribute.name, err);
        }
    }
    Ok(())
}

/// Rectangle through the DEM's four corners, reprojected into `target`.
fn dem_polygon(dem: &Path, target: &SpatialRef) -> Result<Geometry> {
    let dem = Dem::open(dem)?;
    let extent = dem.reference.extent;

    let corners = match dem.dataset.spatial_ref() {
        Ok(source) => project_corners(&extent, &source, target)?,
        Err(_) => {
            tracing::warn!("DEM has no spatial reference, using its coordinates as is");
            extent.corners()
        }
    };

    let [ll, ul, ur, lr] = corners;
    let wkt = format!(
        "POLYGON (({} {}, {} {}, {} {}, {} {}, {} {}))",
        ll.0, ll.1, ul.0, ul.1, ur.0, ur.1, lr.0, lr.1, ll.0, ll.1
    );
    Ok(Geometry::from_wkt(&wkt)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridExtent, BLOCK_SHAPE_DOMAIN, SOIL_TYPE_DOMAIN};
    use crate::writer::{GridSpec, GridWriter};
    use tempfile::TempDir;

    fn drivers_available() -> bool {
        DriverManager::get_driver_by_name("GPKG").is_ok()
            && DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    fn request(path: &Path, forest: ForestMode, dem: Option<PathBuf>) -> FeatureClassRequest {
        FeatureClassRequest {
            geopackage: path.to_path_buf(),
            name: "rockfall_areas".to_string(),
            spatial_ref: "EPSG:25833".to_string(),
            forest,
            dem,
        }
    }

    fn field_names(path: &Path) -> Vec<String> {
        let dataset = Dataset::open(path).unwrap();
        let layer = dataset.layer_by_name("rockfall_areas").unwrap();
        layer.defn().fields().map(|f| f.name()).collect()
    }

    #[test]
    fn test_create_feature_class() {
        if !drivers_available() {
            eprintln!("Skipping test: GPKG driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.gpkg");

        create_feature_class(&request(&path, ForestMode::None, None)).unwrap();

        assert_eq!(
            field_names(&path),
            vec!["rockdensity", "d1", "d2", "d3", "blshape", "rg70", "rg20", "rg10", "soiltype"]
        );
        let dataset = Dataset::open(&path).unwrap();
        assert!(has_domain(&dataset, BLOCK_SHAPE_DOMAIN).unwrap());
        assert!(has_domain(&dataset, SOIL_TYPE_DOMAIN).unwrap());
        drop(dataset);

        // 同名は作成できない
        let err = create_feature_class(&request(&path, ForestMode::None, None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::FeatureClassExists(_))
        ));
    }

    #[test]
    fn test_forest_fields_and_existing_domains() {
        if !drivers_available() {
            eprintln!("Skipping test: GPKG driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.gpkg");

        let mut first = request(&path, ForestMode::TreeFile, None);
        first.name = "tree_file_areas".to_string();
        create_feature_class(&first).unwrap();

        // ドメインは再利用される
        create_feature_class(&request(&path, ForestMode::RasterMaps, None)).unwrap();
        let names = field_names(&path);
        assert_eq!(names.len(), 13);
        assert_eq!(&names[9..], &["nrtrees", "dbhmean", "dbhstd", "conif_percent"]);
    }

    #[test]
    fn test_seed_polygon_from_dem() {
        if !drivers_available() {
            eprintln!("Skipping test: GPKG/GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let dem_path = temp_dir.path().join("dem.tif");
        let wkt = SpatialRef::from_epsg(25833).unwrap().to_wkt().unwrap();
        let grid = GridSpec {
            extent: GridExtent::new(500_000.0, 6_700_000.0, 500_100.0, 6_700_050.0),
            cell_size: 10.0,
            projection: &wkt,
        };
        GridWriter::new()
            .write_values(&grid, vec![100.0; 50], &dem_path)
            .unwrap();

        let path = temp_dir.path().join("project.gpkg");
        create_feature_class(&request(&path, ForestMode::None, Some(dem_path))).unwrap();

        let dataset = Dataset::open(&path).unwrap();
        let mut layer = dataset.layer_by_name("rockfall_areas").unwrap();
        let features: Vec<_> = layer.features().collect();
        assert_eq!(features.len(), 1);
        let envelope = features[0].geometry().unwrap().envelope();
        assert!((envelope.MinX - 500_000.0).abs() < 1e-6);
        assert!((envelope.MaxY - 6_700_050.0).abs() < 1e-6);
        // 既定値
        let index = features[0].field_index("blshape").unwrap();
        assert_eq!(features[0].field_as_integer(index).unwrap(), Some(0));
    }
}
