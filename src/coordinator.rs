use crate::config::{ConfigId, CrawlConfig};
use crate::error::{Error, Result};
use crate::metrics::collector::MetricsCollector;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::spider::{Collaborator, CrawlJob};
use crate::store::ConfigStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Record of one finished run, handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRun {
    pub config_id: ConfigId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub message: String,
    pub items: u64,
}

impl CrawlRun {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    /// Turns a failed run into [`Error::CollaboratorFailure`].
    pub fn into_result(self) -> Result<CrawlRun> {
        match self.outcome {
            RunOutcome::Succeeded => Ok(self),
            RunOutcome::Failed => Err(Error::CollaboratorFailure(self.message)),
        }
    }
}

type RunningSet = Arc<Mutex<HashMap<ConfigId, DateTime<Utc>>>>;

fn lock(running: &RunningSet) -> MutexGuard<'_, HashMap<ConfigId, DateTime<Utc>>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a configuration in the `Running` state; dropping it returns the
/// configuration to `Idle`.
struct RunClaim {
    id: ConfigId,
    started_at: DateTime<Utc>,
    running: RunningSet,
    metrics: Arc<MetricsCollector>,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.id);
        self.metrics.decrement_active_runs();
    }
}

/// Drives runs of stored configurations through the collaborator and
/// writes each outcome back to the store.
///
/// At most one run per configuration is in flight; runs of different
/// configurations overlap freely.
pub struct Coordinator {
    store: Arc<ConfigStore>,
    collaborator: Arc<dyn Collaborator>,
    running: RunningSet,
    metrics: Arc<MetricsCollector>,
}

impl Coordinator {
    pub fn new(
        store: Arc<ConfigStore>,
        collaborator: Arc<dyn Collaborator>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            store,
            collaborator,
            running: Arc::new(Mutex::new(HashMap::new())),
            metrics: metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new())),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn state(&self, id: ConfigId) -> RunState {
        if lock(&self.running).contains_key(&id) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// Configurations currently running, with their start times.
    pub fn running(&self) -> Vec<(ConfigId, DateTime<Utc>)> {
        let mut running: Vec<_> = lock(&self.running)
            .iter()
            .map(|(id, started)| (*id, *started))
            .collect();
        running.sort();
        running
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs `id` once.
    ///
    /// Collaborator failures are not errors here: they are recorded and
    /// come back as a run with [`RunOutcome::Failed`]. Use
    /// [`CrawlRun::into_result`] to treat them as errors.
    pub async fn trigger(&self, id: ConfigId) -> Result<CrawlRun> {
        self.metrics.increment_runs_requested();
        let (config, claim) = match self.admit(id).await {
            Ok(admitted) => admitted,
            Err(e) => {
                self.metrics.increment_runs_rejected();
                log::warn!("Run of configuration {} rejected: {}", id, e);
                return Err(e);
            }
        };

        let started_at = claim.started_at;
        let clock = Instant::now();
        log::info!("Starting run of configuration {} '{}'", id, config.name());

        let result = self.collaborator.crawl(CrawlJob::from(&config)).await;
        let finished_at = Utc::now();
        let elapsed = clock.elapsed();

        let (outcome, message, items) = match result {
            Ok(report) => {
                self.metrics.record_success(elapsed, report.items);
                log::info!(
                    "Run of configuration {} succeeded with {} items in {:?}",
                    id,
                    report.items,
                    elapsed
                );
                (
                    RunOutcome::Succeeded,
                    format!("produced {} items", report.items),
                    report.items,
                )
            }
            Err(failure) => {
                self.metrics.record_failure(elapsed);
                log::error!("Run of configuration {} failed: {}", id, failure);
                (RunOutcome::Failed, failure.reason, 0)
            }
        };

        let written = self
            .store
            .record_run(id, outcome == RunOutcome::Succeeded, finished_at)
            .await;
        drop(claim);
        if let Err(e) = written {
            log::warn!(
                "Run of configuration {} finished as {:?} ({}) but was not recorded: {}",
                id,
                outcome,
                message,
                e
            );
            return Err(e);
        }

        Ok(CrawlRun {
            config_id: id,
            started_at,
            finished_at,
            outcome,
            message,
            items,
        })
    }

    async fn admit(&self, id: ConfigId) -> Result<(CrawlConfig, RunClaim)> {
        let config = self.store.get(id).await?;
        if !config.is_active {
            return Err(Error::Inactive(id));
        }

        let mut running = lock(&self.running);
        if running.contains_key(&id) {
            return Err(Error::AlreadyRunning(id));
        }
        let started_at = Utc::now();
        running.insert(id, started_at);
        drop(running);

        self.metrics.increment_active_runs();
        let claim = RunClaim {
            id,
            started_at,
            running: self.running.clone(),
            metrics: self.metrics.clone(),
        };
        Ok((config, claim))
    }
}
