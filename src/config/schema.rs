use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Opaque identifier of a stored configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(u64);

impl ConfigId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConfigId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Float,
    Integer,
    Boolean,
}

impl FieldType {
    pub const ALL: [&'static str; 4] = ["string", "float", "integer", "boolean"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "string" => Some(FieldType::String),
            "float" => Some(FieldType::Float),
            "integer" => Some(FieldType::Integer),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

/// One extraction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub selector: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiderSettings {
    /// Seconds to wait after each request.
    #[serde(default = "default_download_delay")]
    pub download_delay: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
}

impl Default for SpiderSettings {
    fn default() -> Self {
        Self {
            download_delay: default_download_delay(),
            user_agent: default_user_agent(),
            concurrent_requests: default_concurrent_requests(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub data_type: String,
    #[serde(default = "default_true")]
    pub save_to_database: bool,
    #[serde(default)]
    pub save_to_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSelector {
    pub list_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url_selector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_selector: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProcessing {
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,
    #[serde(default = "default_true")]
    pub clean_text: bool,
    #[serde(default = "default_true")]
    pub validate_data: bool,
}

impl Default for DataProcessing {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            clean_text: true,
            validate_data: true,
        }
    }
}

/// The editable portion of a crawl configuration, as produced by the
/// document validator. Nothing downstream of validation reads raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub name: String,
    pub website_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub spider_settings: SpiderSettings,
    pub start_urls: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_domains: Vec<String>,
    pub data_fields: BTreeMap<String, FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_selector: Option<ItemSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub data_processing: DataProcessing,
    pub output_settings: OutputSettings,
}

impl ConfigPayload {
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.data_fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}

/// A stored configuration with its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub id: ConfigId,
    #[serde(flatten)]
    pub payload: ConfigPayload,
    pub is_active: bool,
    pub run_count: u64,
    pub success_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl CrawlConfig {
    pub fn new(id: ConfigId, payload: ConfigPayload, now: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            is_active: true,
            run_count: 0,
            success_count: 0,
            created_at: now,
            updated_at: now,
            last_run_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.payload.name
    }
}

fn default_download_delay() -> f64 {
    1.0
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_concurrent_requests() -> usize {
    16
}

fn default_max_pages() -> u32 {
    10
}

fn default_true() -> bool {
    true
}
