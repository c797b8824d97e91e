pub mod extract;
pub mod http;

pub use http::HttpSpider;

use crate::config::{ConfigId, ConfigPayload, CrawlConfig};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Everything a collaborator needs to perform one run.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub config_id: ConfigId,
    pub payload: ConfigPayload,
}

impl From<&CrawlConfig> for CrawlJob {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            config_id: config.id,
            payload: config.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Records written to the configured sinks.
    pub items: u64,
}

/// A collaborator-reported failure, including timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CrawlFailure {
    pub reason: String,
}

impl CrawlFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<crate::error::Error> for CrawlFailure {
    fn from(err: crate::error::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Performs the actual data acquisition for a run.
///
/// Implementations own all network I/O, parsing, rate limiting and sink
/// writes. They are called without any store lock held.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn crawl(&self, job: CrawlJob) -> Result<CrawlReport, CrawlFailure>;
}
