use super::{crawl_time, OutputHandler};
use crate::config::ConfigId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

/// Writes records into a table named after the sink kind. The record
/// itself is kept as JSON because fields differ between configurations.
pub struct SqliteOutput {
    pool: SqlitePool,
    table_name: String,
    config_id: i64,
}

impl SqliteOutput {
    pub async fn new(pool: SqlitePool, table_name: String, config_id: ConfigId) -> Result<Self> {
        if !is_identifier(&table_name) {
            return Err(Error::Config(format!(
                "'{}' cannot be used as a table name",
                table_name
            )));
        }
        let config_id = i64::try_from(config_id.get())
            .map_err(|_| Error::Internal(format!("config id {} out of range", config_id)))?;

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_id INTEGER NOT NULL,
                source_url TEXT,
                record TEXT NOT NULL,
                crawl_time TEXT NOT NULL
            )",
            table_name
        );
        sqlx::query(&query).execute(&pool).await?;

        Ok(Self {
            pool,
            table_name,
            config_id,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl OutputHandler for SqliteOutput {
    async fn write(&mut self, item: Value) -> Result<()> {
        let source_url = item
            .get("source_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        let record = serde_json::to_string(&item)?;

        let query = format!(
            "INSERT INTO {} (config_id, source_url, record, crawl_time) VALUES (?1, ?2, ?3, ?4)",
            self.table_name
        );
        sqlx::query(&query)
            .bind(self.config_id)
            .bind(source_url)
            .bind(record)
            .bind(crawl_time())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
