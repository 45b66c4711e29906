//! 実行前の入力チェック

use gdal::vector::LayerAccess;
use gdal::Dataset;
use std::path::Path;

use crate::error::{Error, Result};

/// GeoPackageのテーブル名の最大長
const MAX_NAME_LENGTH: usize = 63;

/// 選択可能なセルサイズ（DEM解像度の1〜10倍）
pub fn cell_size_choices(native: f64) -> Vec<f64> {
    (1..=10).map(|k| native * k as f64).collect()
}

pub fn is_cell_size_choice(cell_size: f64, native: f64) -> bool {
    cell_size_choices(native)
        .iter()
        .any(|choice| (choice - cell_size).abs() <= native.abs() * 1e-9)
}

/// Whether `path` names a GeoPackage (the only local database supported).
pub fn is_local_database(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpkg"))
}

pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_NAME_LENGTH
        && !name.to_ascii_lowercase().starts_with("gpkg_");

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Checks a new feature class destination before anything is written.
pub fn feature_class_destination(geopackage: &Path, name: &str) -> Result<()> {
    if !is_local_database(geopackage) {
        return Err(Error::NotLocalDatabase(geopackage.to_path_buf()));
    }
    validate_table_name(name)?;

    if geopackage.exists() {
        let dataset = Dataset::open(geopackage)?;
        let exists = dataset
            .layers()
            .any(|layer| layer.name().eq_ignore_ascii_case(name));
        if exists {
            return Err(Error::FeatureClassExists(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cell_size_choices() {
        let choices = cell_size_choices(2.0);
        assert_eq!(choices.len(), 10);
        assert_eq!(choices[0], 2.0);
        assert_eq!(choices[9], 20.0);
        assert!(is_cell_size_choice(10.0, 2.0));
        assert!(is_cell_size_choice(0.3, 0.1));
        assert!(!is_cell_size_choice(3.0, 2.0));
        assert!(!is_cell_size_choice(22.0, 2.0));
    }

    #[test]
    fn test_table_names() {
        for name in ["rockfall", "Area_1", "a"] {
            assert!(validate_table_name(name).is_ok(), "{}", name);
        }
        for name in ["", "1area", "area 1", "área", "gpkg_contents", &"a".repeat(64)] {
            assert!(
                matches!(validate_table_name(name), Err(Error::InvalidName(_))),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_destination_must_be_geopackage() {
        let result = feature_class_destination(&PathBuf::from("/tmp/out/areas.shp"), "areas");
        assert!(matches!(result, Err(Error::NotLocalDatabase(_))));
        assert!(is_local_database(Path::new("db/Project.GPKG")));
    }

    #[test]
    fn test_new_geopackage_is_accepted() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("new.gpkg");
        assert!(feature_class_destination(&path, "areas").is_ok());
    }
}
