//! 対象範囲ポリゴンレイヤーの読み込み

use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use gdal_sys::OGRFieldType;
use std::path::Path;

use crate::error::{Error, Result};
use crate::extent::gis_order;
use crate::model::{AttributeSpec, GridExtent};
use crate::writer::GridType;

#[derive(Debug, Clone)]
pub struct LayerField {
    pub name: String,
    pub grid_type: GridType,
    /// 文字列などの非数値フィールドは false
    pub numeric: bool,
}

/// Polygons of the area of interest with their attribute values.
pub struct AoiLayer {
    pub name: String,
    pub fields: Vec<LayerField>,
    pub spatial_ref: Option<SpatialRef>,
    pub geometries: Vec<Geometry>,
    /// `fields` と同じ順序、地物ごとの値（NULLは None）
    pub values: Vec<Vec<Option<f64>>>,
}

impl AoiLayer {
    /// Reads `layer_name` (or the first layer) from the dataset at `path`.
    pub fn read(path: &Path, layer_name: Option<&str>) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let mut layer = match layer_name {
            Some(name) => dataset
                .layer_by_name(name)
                .map_err(|_| Error::MissingLayer(name.to_string()))?,
            None => dataset
                .layer(0)
                .map_err(|_| Error::MissingLayer(path.display().to_string()))?,
        };

        let fields: Vec<LayerField> = layer
            .defn()
            .fields()
            .map(|field| {
                let field_type = field.field_type();
                LayerField {
                    name: field.name(),
                    grid_type: match field_type {
                        OGRFieldType::OFTInteger | OGRFieldType::OFTInteger64 => GridType::Integer,
                        _ => GridType::Float,
                    },
                    numeric: matches!(
                        field_type,
                        OGRFieldType::OFTInteger
                            | OGRFieldType::OFTInteger64
                            | OGRFieldType::OFTReal
                    ),
                }
            })
            .collect();
        let spatial_ref = layer.spatial_ref();
        let name = layer.name();

        let mut geometries = Vec::new();
        let mut values = Vec::new();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            let mut row = Vec::with_capacity(fields.len());
            for field in &fields {
                if !field.numeric {
                    // 非数値フィールドは焼き込まない
                    row.push(None);
                    continue;
                }
                let index = feature.field_index(&field.name)?;
                row.push(feature.field_as_double(index)?);
            }
            geometries.push(geometry.clone());
            values.push(row);
        }

        tracing::info!(
            "Layer '{}': {} polygons, {} fields",
            name,
            geometries.len(),
            fields.len()
        );

        Ok(Self {
            name,
            fields,
            spatial_ref,
            geometries,
            values,
        })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn field_position(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }

    /// Fails with `MissingField` on the first attribute the layer lacks.
    pub fn require(&self, attributes: &[AttributeSpec]) -> Result<()> {
        for attribute in attributes {
            self.field_position(attribute.name)?;
        }
        Ok(())
    }

    pub fn grid_type(&self, attribute: &AttributeSpec) -> Result<GridType> {
        Ok(self.fields[self.field_position(attribute.name)?].grid_type)
    }

    /// Bounding box of all geometries, in the layer's own reference.
    pub fn extent(&self) -> Option<GridExtent> {
        self.geometries
            .iter()
            .map(|g| g.envelope())
            .map(|e| GridExtent::new(e.MinX, e.MinY, e.MaxX, e.MaxY))
            .reduce(|a, b| GridExtent {
                xmin: a.xmin.min(b.xmin),
                ymin: a.ymin.min(b.ymin),
                xmax: a.xmax.max(b.xmax),
                ymax: a.ymax.max(b.ymax),
            })
    }

    /// Geometries and burn values for `attribute`; features with a NULL
    /// value are left out so their cells stay no-data.
    pub fn burn_inputs(&self, attribute: &AttributeSpec) -> Result<(Vec<Geometry>, Vec<f64>)> {
        let position = self.field_position(attribute.name)?;
        Ok(self
            .geometries
            .iter()
            .zip(&self.values)
            .filter_map(|(geometry, row)| row[position].map(|v| (geometry.clone(), v)))
            .unzip())
    }

    /// ジオメトリを `target` 座標系へ投影する（同一なら何もしない）
    pub fn project_to(&mut self, target: &SpatialRef) -> Result<()> {
        let Some(source) = &self.spatial_ref else {
            return Ok(());
        };
        if source == target {
            return Ok(());
        }

        let transform = CoordTransform::new(&gis_order(source), &gis_order(target))?;
        self.geometries = self
            .geometries
            .iter()
            .map(|g| g.transform(&transform))
            .collect::<std::result::Result<_, _>>()?;
        self.spatial_ref = Some(target.clone());
        Ok(())
    }
}
