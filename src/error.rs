use crate::config::ConfigId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single problem found while validating a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending value, e.g. `data_fields.price.type`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid field spec: {attribute}: {message}")]
    InvalidFieldSpec { attribute: String, message: String },

    #[error("Invalid config: {}", join_problems(.0))]
    InvalidConfig(Vec<FieldError>),

    #[error("A configuration named '{0}' already exists")]
    DuplicateName(String),

    #[error("Configuration {0} not found")]
    NotFound(ConfigId),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Configuration {0} is inactive")]
    Inactive(ConfigId),

    #[error("Configuration {0} is already running")]
    AlreadyRunning(ConfigId),

    #[error("Crawl failed: {0}")]
    CollaboratorFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_problems(problems: &[FieldError]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Stable, serializable name of an [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidFieldSpec,
    InvalidConfig,
    DuplicateName,
    NotFound,
    UnknownTemplate,
    Inactive,
    AlreadyRunning,
    CollaboratorFailure,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFieldSpec { .. } => ErrorKind::InvalidFieldSpec,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnknownTemplate(_) => ErrorKind::UnknownTemplate,
            Error::Inactive(_) => ErrorKind::Inactive,
            Error::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Error::CollaboratorFailure(_) => ErrorKind::CollaboratorFailure,
            _ => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for the dashboard boundary.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidFieldSpec | ErrorKind::InvalidConfig => 400,
            ErrorKind::NotFound | ErrorKind::UnknownTemplate => 404,
            ErrorKind::DuplicateName | ErrorKind::AlreadyRunning | ErrorKind::Inactive => 409,
            ErrorKind::CollaboratorFailure => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// Field-level problems carried by validation failures.
    pub fn problems(&self) -> Vec<FieldError> {
        match self {
            Error::InvalidConfig(problems) => problems.clone(),
            Error::InvalidFieldSpec { attribute, message } => {
                vec![FieldError::new(attribute.clone(), message.clone())]
            }
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
