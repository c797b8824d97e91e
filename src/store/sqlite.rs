use super::ConfigRepository;
use crate::config::{ConfigId, ConfigPayload, CrawlConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS crawler_configs (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    website_name TEXT NOT NULL,
    config_json TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_run_at TEXT,
    run_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0
)";

const UPSERT: &str = "INSERT INTO crawler_configs (
    id, name, description, website_name, config_json, is_active,
    created_at, updated_at, last_run_at, run_count, success_count
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    website_name = excluded.website_name,
    config_json = excluded.config_json,
    is_active = excluded.is_active,
    updated_at = excluded.updated_at,
    last_run_at = excluded.last_run_at,
    run_count = excluded.run_count,
    success_count = excluded.success_count";

/// Stores configurations in a `crawler_configs` table. The editable
/// payload is kept as JSON in `config_json`; the descriptive columns are
/// duplicated for ad-hoc queries.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        Self::new(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(row: &SqliteRow) -> Result<CrawlConfig> {
        let id: i64 = row.try_get("id")?;
        let config_json: String = row.try_get("config_json")?;
        let payload: ConfigPayload = serde_json::from_str(&config_json)?;
        let last_run_at: Option<String> = row.try_get("last_run_at")?;

        Ok(CrawlConfig {
            id: ConfigId::new(to_unsigned(id, "id")?),
            payload,
            is_active: row.try_get("is_active")?,
            run_count: to_unsigned(row.try_get("run_count")?, "run_count")?,
            success_count: to_unsigned(row.try_get("success_count")?, "success_count")?,
            created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_time(&row.try_get::<String, _>("updated_at")?)?,
            last_run_at: last_run_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

#[async_trait]
impl ConfigRepository for SqliteRepository {
    async fn load_all(&self) -> Result<Vec<CrawlConfig>> {
        let rows = sqlx::query(
            "SELECT id, config_json, is_active, created_at, updated_at, last_run_at,
                    run_count, success_count
             FROM crawler_configs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn upsert(&self, config: &CrawlConfig) -> Result<()> {
        let config_json = serde_json::to_string(&config.payload)?;
        sqlx::query(UPSERT)
            .bind(to_signed(config.id.get())?)
            .bind(config.payload.name.as_str())
            .bind(config.payload.description.as_deref())
            .bind(config.payload.website_name.as_str())
            .bind(config_json)
            .bind(config.is_active)
            .bind(config.created_at.to_rfc3339())
            .bind(config.updated_at.to_rfc3339())
            .bind(config.last_run_at.map(|t| t.to_rfc3339()))
            .bind(to_signed(config.run_count)?)
            .bind(to_signed(config.success_count)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: ConfigId) -> Result<()> {
        sqlx::query("DELETE FROM crawler_configs WHERE id = ?1")
            .bind(to_signed(id.get())?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp '{}': {}", raw, e)))
}

fn to_signed(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Internal(format!("{} does not fit in i64", value)))
}

fn to_unsigned(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Internal(format!("negative {} in database", column)))
}
