#![allow(dead_code)]

use async_trait::async_trait;
use crawlconf::config::{DocumentValidator, SinkKinds};
use crawlconf::spider::{Collaborator, CrawlFailure, CrawlJob, CrawlReport};
use crawlconf::store::ConfigStore;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

pub fn validator() -> DocumentValidator {
    DocumentValidator::new(SinkKinds::default())
}

pub fn memory_store() -> Arc<ConfigStore> {
    Arc::new(ConfigStore::in_memory(validator()))
}

pub fn document(name: &str) -> Value {
    json!({
        "name": name,
        "website_name": "Example Exchange",
        "start_urls": ["https://example.com/quotes"],
        "spider_settings": {"download_delay": 0.0},
        "data_fields": {
            "symbol": {"selector": ".symbol::text", "type": "string", "required": true}
        },
        "output_settings": {"data_type": "stock_data"}
    })
}

/// Replays a fixed list of outcomes, succeeding once the list runs out.
#[derive(Default)]
pub struct Scripted {
    outcomes: Mutex<VecDeque<Result<u64, String>>>,
    pub calls: Mutex<Vec<CrawlJob>>,
}

impl Scripted {
    pub fn new(outcomes: impl IntoIterator<Item = Result<u64, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Collaborator for Scripted {
    async fn crawl(&self, job: CrawlJob) -> Result<CrawlReport, CrawlFailure> {
        self.calls.lock().unwrap().push(job);
        let next = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(0));
        next.map(|items| CrawlReport { items })
            .map_err(CrawlFailure::new)
    }
}

/// Parks every run until a permit is added to `release`.
pub struct Gated {
    pub started: Notify,
    pub release: Semaphore,
}

impl Default for Gated {
    fn default() -> Self {
        Self {
            started: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl Collaborator for Gated {
    async fn crawl(&self, _job: CrawlJob) -> Result<CrawlReport, CrawlFailure> {
        self.started.notify_one();
        let _permit = self.release.acquire().await.unwrap();
        Ok(CrawlReport { items: 1 })
    }
}
