pub mod repository;
pub mod sqlite;

pub use repository::{ConfigRepository, MemoryRepository};
pub use sqlite::SqliteRepository;

use crate::config::{ConfigId, ConfigPayload, CrawlConfig, DocumentValidator};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// `None` once the configuration has been deleted.
type Slot = Arc<Mutex<Option<CrawlConfig>>>;

/// Owns every stored configuration.
///
/// Each configuration sits behind its own lock, so mutations of one id are
/// serialized while different ids proceed independently. The `entries`
/// and `names` indexes are only ever held briefly and never while waiting
/// on a slot lock.
pub struct ConfigStore {
    validator: DocumentValidator,
    repository: Arc<dyn ConfigRepository>,
    entries: RwLock<BTreeMap<ConfigId, Slot>>,
    names: Mutex<HashMap<String, ConfigId>>,
    next_id: AtomicU64,
}

impl ConfigStore {
    pub fn in_memory(validator: DocumentValidator) -> Self {
        Self {
            validator,
            repository: Arc::new(MemoryRepository),
            entries: RwLock::new(BTreeMap::new()),
            names: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a store over `repository`, loading everything it holds.
    pub async fn open(
        repository: Arc<dyn ConfigRepository>,
        validator: DocumentValidator,
    ) -> Result<Self> {
        let existing = repository.load_all().await?;
        let mut entries = BTreeMap::new();
        let mut names = HashMap::new();
        let mut next_id = 1;

        for config in existing {
            next_id = next_id.max(config.id.get() + 1);
            if names.insert(config.payload.name.clone(), config.id).is_some() {
                log::warn!("Duplicate configuration name '{}' in repository", config.payload.name);
            }
            entries.insert(config.id, Arc::new(Mutex::new(Some(config))));
        }
        log::info!("Loaded {} crawl configurations", entries.len());

        Ok(Self {
            validator,
            repository,
            entries: RwLock::new(entries),
            names: Mutex::new(names),
            next_id: AtomicU64::new(next_id),
        })
    }

    pub fn validator(&self) -> &DocumentValidator {
        &self.validator
    }

    pub async fn create(&self, doc: &Value) -> Result<CrawlConfig> {
        let payload = self.validator.validate(doc)?;
        self.insert(payload).await
    }

    async fn insert(&self, payload: ConfigPayload) -> Result<CrawlConfig> {
        let id = ConfigId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.reserve_name(&payload.name, id).await?;

        let config = CrawlConfig::new(id, payload, Utc::now());
        if let Err(e) = self.repository.upsert(&config).await {
            self.release_name(&config.payload.name, id).await;
            return Err(e);
        }

        self.entries
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Some(config.clone()))));
        log::info!("Created configuration {} '{}'", id, config.payload.name);
        Ok(config)
    }

    /// Replaces the editable fields of `id`. Counters, activity flag and
    /// creation time are preserved.
    pub async fn update(&self, id: ConfigId, doc: &Value) -> Result<CrawlConfig> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let current = guard.as_ref().ok_or(Error::NotFound(id))?;
        let payload = self.validator.validate(doc)?;

        let old_name = current.payload.name.clone();
        let renamed = payload.name != old_name;
        if renamed {
            self.reserve_name(&payload.name, id).await?;
        }

        let mut updated = current.clone();
        updated.payload = payload;
        updated.updated_at = Utc::now();

        if let Err(e) = self.repository.upsert(&updated).await {
            if renamed {
                self.release_name(&updated.payload.name, id).await;
            }
            return Err(e);
        }
        if renamed {
            self.release_name(&old_name, id).await;
        }

        *guard = Some(updated.clone());
        log::info!("Updated configuration {} '{}'", id, updated.payload.name);
        Ok(updated)
    }

    pub async fn get(&self, id: ConfigId) -> Result<CrawlConfig> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        guard.clone().ok_or(Error::NotFound(id))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<CrawlConfig>> {
        let id = self.names.lock().await.get(name).copied();
        match id {
            Some(id) => match self.get(id).await {
                Ok(config) => Ok(Some(config)),
                Err(Error::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    /// All configurations ordered by id.
    pub async fn list(&self) -> Vec<CrawlConfig> {
        let slots: Vec<Slot> = self.entries.read().await.values().cloned().collect();
        let mut configs = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(config) = slot.lock().await.clone() {
                configs.push(config);
            }
        }
        configs
    }

    pub async fn set_active(&self, id: ConfigId, active: bool) -> Result<CrawlConfig> {
        let config = self
            .modify(id, |config| {
                config.is_active = active;
                config.updated_at = Utc::now();
            })
            .await?;
        log::info!(
            "Configuration {} is now {}",
            id,
            if active { "active" } else { "inactive" }
        );
        Ok(config)
    }

    /// Writes a run outcome back: always counts the run, counts a success
    /// only when `succeeded`.
    pub async fn record_run(
        &self,
        id: ConfigId,
        succeeded: bool,
        finished_at: DateTime<Utc>,
    ) -> Result<CrawlConfig> {
        self.modify(id, |config| {
            config.run_count += 1;
            if succeeded {
                config.success_count += 1;
            }
            config.updated_at = finished_at;
            config.last_run_at = Some(finished_at);
        })
        .await
    }

    pub async fn delete(&self, id: ConfigId) -> Result<()> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let name = match guard.as_ref() {
            Some(config) => config.payload.name.clone(),
            None => return Err(Error::NotFound(id)),
        };

        self.repository.remove(id).await?;
        *guard = None;
        drop(guard);

        self.entries.write().await.remove(&id);
        self.release_name(&name, id).await;
        log::info!("Deleted configuration {} '{}'", id, name);
        Ok(())
    }

    async fn modify<F>(&self, id: ConfigId, change: F) -> Result<CrawlConfig>
    where
        F: FnOnce(&mut CrawlConfig),
    {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let mut updated = guard.clone().ok_or(Error::NotFound(id))?;
        change(&mut updated);
        self.repository.upsert(&updated).await?;
        *guard = Some(updated.clone());
        Ok(updated)
    }

    async fn slot(&self, id: ConfigId) -> Result<Slot> {
        self.entries
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn reserve_name(&self, name: &str, id: ConfigId) -> Result<()> {
        let mut names = self.names.lock().await;
        match names.get(name) {
            Some(owner) if *owner != id => Err(Error::DuplicateName(name.to_string())),
            _ => {
                names.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    async fn release_name(&self, name: &str, id: ConfigId) {
        let mut names = self.names.lock().await;
        if names.get(name) == Some(&id) {
            names.remove(name);
        }
    }
}
