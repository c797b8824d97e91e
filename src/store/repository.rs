use crate::config::{ConfigId, CrawlConfig};
use crate::error::Result;
use async_trait::async_trait;

/// Durable backing for the [`ConfigStore`](super::ConfigStore).
///
/// The store keeps the authoritative in-memory copy and writes through on
/// every mutation; a failed write aborts that mutation.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<CrawlConfig>>;
    async fn upsert(&self, config: &CrawlConfig) -> Result<()>;
    async fn remove(&self, id: ConfigId) -> Result<()>;
}

/// Keeps nothing; configurations live only as long as the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryRepository;

#[async_trait]
impl ConfigRepository for MemoryRepository {
    async fn load_all(&self) -> Result<Vec<CrawlConfig>> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _config: &CrawlConfig) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _id: ConfigId) -> Result<()> {
        Ok(())
    }
}
