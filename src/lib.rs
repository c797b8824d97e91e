pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod output;
pub mod settings;
pub mod spider;
pub mod store;
pub mod template;

pub use api::{Api, Request, Response};
pub use config::{ConfigId, ConfigPayload, CrawlConfig, DocumentValidator, SinkKinds};
pub use coordinator::{Coordinator, CrawlRun, RunOutcome, RunState};
pub use error::{Error, Result};
pub use metrics::collector::MetricsCollector;
pub use metrics::snapshot::MetricsSnapshot;
pub use settings::Settings;
pub use spider::{Collaborator, CrawlFailure, CrawlJob, CrawlReport, HttpSpider};
pub use store::ConfigStore;
pub use template::{Overrides, TemplateRegistry};
