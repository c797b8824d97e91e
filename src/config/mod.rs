pub mod field;
pub mod loader;
pub mod schema;
pub mod validation;

pub use field::validate_field;
pub use loader::ConfigLoader;
pub use schema::{
    ConfigId, ConfigPayload, CrawlConfig, DataProcessing, FieldSpec, FieldType, ItemSelector,
    OutputSettings, Pagination, SpiderSettings,
};
pub use validation::{DocumentValidator, SinkKinds, MAX_DOWNLOAD_DELAY};
