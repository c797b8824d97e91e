use crate::config::schema::ConfigPayload;
use crate::config::validation::DocumentValidator;
use crate::error::{Error, FieldError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Reads configuration documents authored as JSON, YAML or TOML files.
pub struct ConfigLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Toml,
}

impl ConfigLoader {
    /// Loads a document as an untyped JSON value, without validating it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Value> {
        let path = path.as_ref();
        let (format, content) = Self::read(path)?;
        Self::parse(format, &content)
    }

    /// Loads a document and runs it through `validator`, returning both the
    /// raw value (for submission through the api) and the typed payload.
    pub fn load_validated<P: AsRef<Path>>(
        path: P,
        validator: &DocumentValidator,
    ) -> Result<(Value, ConfigPayload)> {
        let path = path.as_ref();
        let (format, content) = Self::read(path)?;
        let value = match format {
            // Text validation also catches repeated data_fields keys.
            Format::Json => {
                let payload = validator.validate_str(&content)?;
                return Ok((serde_json::from_str(&content)?, payload));
            }
            other => Self::parse(other, &content).map_err(|e| {
                Error::InvalidConfig(vec![FieldError::new(
                    "$",
                    format!("malformed {:?}: {}", other, e),
                )])
            })?,
        };
        let payload = validator.validate(&value)?;
        Ok((value, payload))
    }

    fn read(path: &Path) -> Result<(Format, String)> {
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("toml") => Format::Toml,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported file extension: {}",
                    path.display()
                )));
            }
        };
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("Read {} bytes from {}", content.len(), path.display());
        Ok((format, content))
    }

    fn parse(format: Format, content: &str) -> Result<Value> {
        let value = match format {
            Format::Json => serde_json::from_str(content)?,
            Format::Yaml => serde_yaml::from_str(content)?,
            Format::Toml => toml::from_str(content)?,
        };
        Ok(value)
    }
}
