pub mod aoi;
pub mod artifact;
pub mod dem;
pub mod error;
pub mod export;
pub mod extent;
pub mod import;
pub mod model;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod validate;
pub mod writer;

pub use error::{Error, Result};
pub use export::{convert_to_ascii, ExportConfig};
pub use extent::{align_extent, check_containment};
pub use import::{convert_from_ascii, ImportConfig, OutputFormat};
pub use model::{ForestMode, GridExtent};
pub use normalize::{normalize_file, normalize_text, NormalizeScope, Separators};
pub use report::{Report, RunWarning};
pub use schema::{create_feature_class, FeatureClassRequest};
pub use writer::GridWriter;
