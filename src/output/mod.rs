use crate::config::{ConfigId, OutputSettings};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

pub mod json;
pub mod sqlite;

pub use json::JsonLinesOutput;
pub use sqlite::SqliteOutput;

#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn write(&mut self, item: Value) -> Result<()>;
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens the sinks a run's `output_settings` ask for.
#[derive(Clone)]
pub struct SinkFactory {
    output_dir: PathBuf,
    pool: Option<SqlitePool>,
}

impl SinkFactory {
    pub fn new(output_dir: PathBuf, pool: Option<SqlitePool>) -> Self {
        Self { output_dir, pool }
    }

    pub async fn open(
        &self,
        config_id: ConfigId,
        settings: &OutputSettings,
    ) -> Result<Vec<Box<dyn OutputHandler>>> {
        let mut sinks: Vec<Box<dyn OutputHandler>> = Vec::new();

        if settings.save_to_file {
            let path = self.output_dir.join(format!("{}.jsonl", settings.data_type));
            sinks.push(Box::new(JsonLinesOutput::new(path, config_id)?));
        }

        if settings.save_to_database {
            match &self.pool {
                Some(pool) => {
                    let sink =
                        SqliteOutput::new(pool.clone(), settings.data_type.clone(), config_id).await?;
                    sinks.push(Box::new(sink));
                }
                None => log::warn!(
                    "Configuration {} asks for database output but no database is configured",
                    config_id
                ),
            }
        }

        if sinks.is_empty() {
            log::warn!("Records of configuration {} will not be saved", config_id);
        }
        Ok(sinks)
    }
}

fn crawl_time() -> String {
    chrono::Utc::now().to_rfc3339()
}
