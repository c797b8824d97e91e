use super::extract::RecordBuilder;
use super::{Collaborator, CrawlFailure, CrawlJob, CrawlReport};
use crate::config::{ConfigPayload, MAX_DOWNLOAD_DELAY};
use crate::error::Result;
use crate::output::{OutputHandler, SinkFactory};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

/// Fetches pages over HTTP and extracts records with ChadSelect.
pub struct HttpSpider {
    request_timeout: Duration,
    run_timeout: Duration,
    sinks: SinkFactory,
}

impl HttpSpider {
    pub fn new(request_timeout: Duration, run_timeout: Duration, sinks: SinkFactory) -> Self {
        Self {
            request_timeout,
            run_timeout,
            sinks,
        }
    }

    async fn run(&self, job: CrawlJob) -> std::result::Result<u64, CrawlFailure> {
        let payload = job.payload;
        let builder = RecordBuilder::new(&payload)?;
        let client = Client::builder()
            .timeout(self.request_timeout)
            .user_agent(payload.spider_settings.user_agent.as_str())
            .build()
            .map_err(crate::error::Error::from)?;
        let sinks = self
            .sinks
            .open(job.config_id, &payload.output_settings)
            .await?;

        let session = Session::new(client, builder, &payload, sinks);
        let concurrency = payload.spider_settings.concurrent_requests.max(1);

        stream::iter(payload.start_urls.iter().cloned())
            .for_each_concurrent(concurrency, |url| session.follow(url))
            .await;

        session.finish().await
    }
}

#[async_trait]
impl Collaborator for HttpSpider {
    async fn crawl(&self, job: CrawlJob) -> std::result::Result<CrawlReport, CrawlFailure> {
        log::debug!("Crawling configuration {}", job.config_id);
        match tokio::time::timeout(self.run_timeout, self.run(job)).await {
            Ok(result) => result.map(|items| CrawlReport { items }),
            Err(_) => Err(CrawlFailure::new(format!(
                "run timed out after {}s",
                self.run_timeout.as_secs()
            ))),
        }
    }
}

/// State shared by every page request of one run.
struct Session {
    client: Client,
    builder: RecordBuilder,
    allowed_domains: Vec<String>,
    max_pages: u32,
    delay: Duration,
    remove_duplicates: bool,
    sinks: Mutex<Vec<Box<dyn OutputHandler>>>,
    seen: StdMutex<HashSet<String>>,
    sink_error: StdMutex<Option<String>>,
    pages_ok: AtomicU64,
    pages_failed: AtomicU64,
    items: AtomicU64,
}

impl Session {
    fn new(
        client: Client,
        builder: RecordBuilder,
        payload: &ConfigPayload,
        sinks: Vec<Box<dyn OutputHandler>>,
    ) -> Self {
        let max_pages = payload
            .pagination
            .as_ref()
            .filter(|p| p.enabled)
            .map_or(1, |p| p.max_pages.max(1));

        Self {
            client,
            builder,
            allowed_domains: payload
                .allowed_domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .collect(),
            max_pages,
            delay: Duration::try_from_secs_f64(
                payload.spider_settings.download_delay.min(MAX_DOWNLOAD_DELAY),
            )
            .unwrap_or_default(),
            remove_duplicates: payload.data_processing.remove_duplicates,
            sinks: Mutex::new(sinks),
            seen: StdMutex::new(HashSet::new()),
            sink_error: StdMutex::new(None),
            pages_ok: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            items: AtomicU64::new(0),
        }
    }

    /// Crawls `start` and the pages its pagination links lead to.
    async fn follow(&self, start: Url) {
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(url) = next.take() {
            if self.sink_failed() || !visited.insert(url.clone()) {
                break;
            }

            match self.fetch(&url).await {
                Ok(html) => {
                    self.pages_ok.fetch_add(1, Ordering::Relaxed);
                    let page = self.builder.scrape(html, &url);
                    log::info!("Extracted {} records from {}", page.records.len(), url);

                    if let Err(e) = self.store(page.records).await {
                        log::error!("Sink write failed: {}", e);
                        self.record_sink_error(e.to_string());
                        break;
                    }
                    next = page
                        .next
                        .filter(|_| visited.len() < self.max_pages as usize)
                        .filter(|n| self.allowed(n));
                }
                Err(e) => {
                    self.pages_failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Failed to fetch {}: {}", url, e);
                }
            }

            sleep(self.delay).await;
        }
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        log::info!("Visiting: {}", url);
        let res = self.client.get(url.clone()).send().await?.error_for_status()?;
        let html = res.text().await?;
        log::debug!("HTML length: {} bytes", html.len());
        Ok(html)
    }

    fn allowed(&self, url: &Url) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        let allowed = self
            .allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
        if !allowed {
            log::debug!("Not following {}: outside allowed domains", url);
        }
        allowed
    }

    async fn store(&self, records: Vec<Value>) -> Result<()> {
        let records: Vec<Value> = if self.remove_duplicates {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            records
                .into_iter()
                .filter(|r| seen.insert(r.to_string()))
                .collect()
        } else {
            records
        };

        let mut sinks = self.sinks.lock().await;
        for record in records {
            for sink in sinks.iter_mut() {
                sink.write(record.clone()).await?;
            }
            self.items.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn sink_failed(&self) -> bool {
        self.sink_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn record_sink_error(&self, message: String) {
        let mut slot = self.sink_error.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert(message);
    }

    async fn finish(self) -> std::result::Result<u64, CrawlFailure> {
        let mut sinks = self.sinks.into_inner();
        for sink in sinks.iter_mut() {
            sink.close().await?;
        }

        if let Some(message) = self
            .sink_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(CrawlFailure::new(format!("output failed: {}", message)));
        }

        let ok = self.pages_ok.into_inner();
        let failed = self.pages_failed.into_inner();
        if ok == 0 {
            return Err(CrawlFailure::new(format!(
                "none of the {} page requests succeeded",
                failed
            )));
        }
        if failed > 0 {
            log::warn!("{} of {} page requests failed", failed, ok + failed);
        }
        Ok(self.items.into_inner())
    }
}
