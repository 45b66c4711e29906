use std::fmt;
use std::str::FromStr;

/// 矩形範囲（xmin, ymin, xmax, ymax）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GridExtent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// 指定セルサイズでの列数
    pub fn columns(&self, cell_size: f64) -> usize {
        (self.width() / cell_size).round().max(0.0) as usize
    }

    /// 指定セルサイズでの行数
    pub fn rows(&self, cell_size: f64) -> usize {
        (self.height() / cell_size).round().max(0.0) as usize
    }

    /// 四隅を LL, UL, UR, LR の順で返す
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.xmin, self.ymin),
            (self.xmin, self.ymax),
            (self.xmax, self.ymax),
            (self.xmax, self.ymin),
        ]
    }

    /// Envelope of four corners given in LL, UL, UR, LR order.
    ///
    /// Each bound only looks at the two corners on its own side, so a box
    /// that was rotated or skewed by reprojection still yields the outer
    /// envelope of its edges.
    pub fn from_corners(corners: [(f64, f64); 4]) -> Self {
        let [ll, ul, ur, lr] = corners;
        Self {
            xmin: ll.0.min(ul.0),
            xmax: lr.0.max(ur.0),
            ymin: ll.1.min(lr.1),
            ymax: ul.1.max(ur.1),
        }
    }

    /// GDALのジオトランスフォーム（北が上）
    pub fn geo_transform(&self, cell_size: f64) -> [f64; 6] {
        [self.xmin, cell_size, 0.0, self.ymax, 0.0, -cell_size]
    }
}

impl fmt::Display for GridExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// DEMから読み取った基準ラスタ情報
#[derive(Debug, Clone)]
pub struct RasterReference {
    pub extent: GridExtent,
    pub cell_size: f64,
    pub columns: usize,
    pub rows: usize,
    /// 空文字列は座標系未定義
    pub projection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Short,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub alias: &'static str,
    pub domain: Option<&'static str>,
    pub default: Option<&'static str>,
}

impl AttributeSpec {
    const fn short(name: &'static str, alias: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Short,
            alias,
            domain: None,
            default: None,
        }
    }

    const fn double(name: &'static str, alias: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Double,
            alias,
            domain: None,
            default: None,
        }
    }
}

pub const BLOCK_SHAPE_DOMAIN: &str = "Block_Shape";
pub const SOIL_TYPE_DOMAIN: &str = "Soil_type";

pub const ROCK_DENSITY: AttributeSpec = AttributeSpec::short("rockdensity", "Rock density [kg/m3]");
pub const D1: AttributeSpec = AttributeSpec::double("d1", "d1: Block height [m]");
pub const D2: AttributeSpec = AttributeSpec::double("d2", "d2: Block width [m]");
pub const D3: AttributeSpec = AttributeSpec::double("d3", "d3: Block length [m]");
pub const BLOCK_SHAPE: AttributeSpec = AttributeSpec {
    name: "blshape",
    kind: FieldKind::Short,
    alias: "Block shape",
    domain: Some(BLOCK_SHAPE_DOMAIN),
    default: Some("0"),
};
pub const RG70: AttributeSpec = AttributeSpec::double("rg70", "Rg70 [m]");
pub const RG20: AttributeSpec = AttributeSpec::double("rg20", "Rg20 [m]");
pub const RG10: AttributeSpec = AttributeSpec::double("rg10", "Rg10 [m]");
pub const SOIL_TYPE: AttributeSpec = AttributeSpec {
    name: "soiltype",
    kind: FieldKind::Short,
    alias: "Soil type",
    domain: Some(SOIL_TYPE_DOMAIN),
    default: None,
};
pub const NR_TREES: AttributeSpec = AttributeSpec::double("nrtrees", "nr trees");
pub const DBH_MEAN: AttributeSpec = AttributeSpec::double("dbhmean", "DBH mean [cm]");
pub const DBH_STD: AttributeSpec = AttributeSpec::double("dbhstd", "DBH std [cm]");
pub const CONIF_PERCENT: AttributeSpec = AttributeSpec::double("conif_percent", "Conif percent");

/// 必須属性（この順序でグリッドが出力される）
pub const REQUIRED_ATTRIBUTES: [AttributeSpec; 9] = [
    ROCK_DENSITY,
    D1,
    D2,
    D3,
    BLOCK_SHAPE,
    RG70,
    RG20,
    RG10,
    SOIL_TYPE,
];

/// 森林の扱い方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForestMode {
    #[default]
    None,
    RasterMaps,
    TreeFile,
}

impl ForestMode {
    pub fn has_tree_maps(&self) -> bool {
        matches!(self, ForestMode::RasterMaps)
    }

    pub fn has_conifer_percent(&self) -> bool {
        matches!(self, ForestMode::RasterMaps | ForestMode::TreeFile)
    }

    /// このモードで作成するフィールド一覧
    pub fn attributes(&self) -> Vec<AttributeSpec> {
        let mut attributes = REQUIRED_ATTRIBUTES.to_vec();
        if self.has_tree_maps() {
            attributes.extend([NR_TREES, DBH_MEAN, DBH_STD]);
        }
        if self.has_conifer_percent() {
            attributes.push(CONIF_PERCENT);
        }
        attributes
    }
}

impl FromStr for ForestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "none" => Ok(ForestMode::None),
            "raster-maps" => Ok(ForestMode::RasterMaps),
            "tree-file" => Ok(ForestMode::TreeFile),
            other => Err(format!(
                "unknown forest mode '{}' (expected none, raster-maps or tree-file)",
                other
            )),
        }
    }
}

/// Attributes to rasterize for a layer carrying `fields`.
///
/// The tree-count and diameter grids come as a set keyed on `nrtrees`;
/// `conif_percent` is independent.
pub fn attribute_field_list<S: AsRef<str>>(fields: &[S]) -> Vec<AttributeSpec> {
    let has = |name: &str| fields.iter().any(|f| f.as_ref() == name);

    let mut attributes = REQUIRED_ATTRIBUTES.to_vec();
    if has(NR_TREES.name) {
        attributes.extend([NR_TREES, DBH_MEAN, DBH_STD]);
    }
    if has(CONIF_PERCENT.name) {
        attributes.push(CONIF_PERCENT);
    }
    attributes
}

/// コード値ドメイン
#[derive(Debug, Clone, Copy)]
pub struct CodedDomain {
    pub name: &'static str,
    pub codes: &'static [(i32, &'static str)],
}

pub const BLOCK_SHAPE_CODES: CodedDomain = CodedDomain {
    name: BLOCK_SHAPE_DOMAIN,
    codes: &[
        (0, "No block form"),
        (1, "Rectangular block"),
        (2, "Ellipsoidal block"),
        (3, "Spherical block"),
        (4, "Disc shaped block"),
    ],
};

pub const SOIL_TYPE_CODES: CodedDomain = CodedDomain {
    name: SOIL_TYPE_DOMAIN,
    codes: &[
        (0, "River, swamp"),
        (1, "Fine soil material (>1m)"),
        (2, "Fine soil material (<1m), sand/gravel"),
        (
            3,
            "Scree, medium compact soil with small rock fragments, forest road",
        ),
        (
            4,
            "Talus slope, compact soil with large rock fragments, forest road",
        ),
        (5, "Bedrock with thin weathered material or soil cover"),
        (6, "Bedrock"),
        (7, "Asphalt road"),
    ],
};

pub const DOMAINS: [CodedDomain; 2] = [BLOCK_SHAPE_CODES, SOIL_TYPE_CODES];

#[cfg(test)]
mod tests {
    use super::*;

    fn names(attributes: &[AttributeSpec]) -> Vec<&'static str> {
        attributes.iter().map(|a| a.name).collect()
    }

    #[test]
    fn test_field_list_without_optional_fields() {
        let fields = ["OBJECTID", "rockdensity", "d1", "d2", "d3", "blshape"];
        let list = attribute_field_list(&fields);
        assert_eq!(
            names(&list),
            vec!["rockdensity", "d1", "d2", "d3", "blshape", "rg70", "rg20", "rg10", "soiltype"]
        );
    }

    #[test]
    fn test_field_list_with_tree_fields() {
        let fields = vec!["nrtrees".to_string(), "conif_percent".to_string()];
        let list = attribute_field_list(&fields);
        assert_eq!(list.len(), 13);
        assert_eq!(
            &names(&list)[9..],
            &["nrtrees", "dbhmean", "dbhstd", "conif_percent"]
        );

        let list = attribute_field_list(&["nrtrees"]);
        assert_eq!(list.len(), 12);
    }

    #[test]
    fn test_field_list_with_conifer_only() {
        let list = attribute_field_list(&["conif_percent"]);
        assert_eq!(list.len(), 10);
        assert_eq!(list.last().unwrap().name, "conif_percent");
    }

    #[test]
    fn test_forest_mode_attributes() {
        assert_eq!(ForestMode::None.attributes().len(), 9);
        assert_eq!(ForestMode::TreeFile.attributes().len(), 10);
        assert_eq!(ForestMode::RasterMaps.attributes().len(), 13);
        assert_eq!("Raster maps".parse::<ForestMode>(), Ok(ForestMode::RasterMaps));
        assert_eq!("tree_file".parse::<ForestMode>(), Ok(ForestMode::TreeFile));
        assert!("forest".parse::<ForestMode>().is_err());
    }

    #[test]
    fn test_domains() {
        assert_eq!(BLOCK_SHAPE_CODES.codes.len(), 5);
        assert_eq!(SOIL_TYPE_CODES.codes.len(), 8);
        assert_eq!(BLOCK_SHAPE.domain, Some(BLOCK_SHAPE_CODES.name));
        assert_eq!(SOIL_TYPE.domain, Some(SOIL_TYPE_CODES.name));
    }

    #[test]
    fn test_from_corners_uses_outer_edges() {
        // 回転した矩形
        let extent = GridExtent::from_corners([(1.0, 0.0), (0.0, 10.0), (11.0, 11.0), (12.0, 1.0)]);
        assert_eq!(extent, GridExtent::new(0.0, 0.0, 12.0, 11.0));
    }

    #[test]
    fn test_extent_dimensions() {
        let extent = GridExtent::new(10.0, 10.0, 80.0, 50.0);
        assert_eq!(extent.columns(10.0), 7);
        assert_eq!(extent.rows(10.0), 4);
        assert_eq!(extent.geo_transform(10.0), [10.0, 10.0, 0.0, 50.0, 0.0, -10.0]);
    }
}
