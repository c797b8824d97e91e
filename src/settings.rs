use crate::config::SinkKinds;
use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const ENV_PREFIX: &str = "CRAWLCONF";

/// Process settings, layered from an optional file and `CRAWLCONF_*`
/// environment variables (`__` separates nested keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    /// Empty means configurations live in memory only.
    pub database_url: String,

    #[validate(custom = "validate_sink_kinds")]
    pub sink_kinds: Vec<String>,

    #[validate(length(min = 1))]
    pub output_dir: String,

    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub run_timeout_secs: u64,

    #[validate(length(min = 1))]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:crawlconf.db?mode=rwc".to_string(),
            sink_kinds: SinkKinds::default().iter().map(str::to_string).collect(),
            output_dir: "output".to_string(),
            request_timeout_secs: 10,
            run_timeout_secs: 300,
            log_level: "info".to_string(),
        }
    }
}

fn validate_sink_kinds(kinds: &[String]) -> std::result::Result<(), ValidationError> {
    if kinds.is_empty() || kinds.iter().any(|k| k.trim().is_empty()) {
        return Err(ValidationError::new("sink_kinds"));
    }
    Ok(())
}

impl Settings {
    /// Loads settings from `path`, or from `crawlconf.{toml,yaml,json}` in
    /// the working directory when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading variables from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("crawlconf").required(false),
        };
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("sink_kinds")
            .try_parsing(true)
            .source(env);

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;

        log::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    pub fn database_url(&self) -> Option<&str> {
        let url = self.database_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn sink_kinds(&self) -> SinkKinds {
        SinkKinds::new(self.sink_kinds.iter().map(|k| k.trim()))
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
