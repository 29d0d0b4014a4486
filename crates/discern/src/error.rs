use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscernError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Category of a failure that reaches a pipeline's `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote analysis call failed or returned a non-success status.
    RequestFailure,
    /// Input preconditions were not met; no request was issued.
    ValidationFailure,
}

/// Errors produced while running a single analysis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("{message}")]
    Request {
        message: String,
        status: Option<u16>,
    },

    #[error("{0}")]
    Validation(String),
}

impl AnalysisError {
    pub fn request(message: impl Into<String>) -> Self {
        AnalysisError::Request {
            message: message.into(),
            status: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AnalysisError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Request { .. } => ErrorKind::RequestFailure,
            AnalysisError::Validation(_) => ErrorKind::ValidationFailure,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache request failed: {0}")]
    Request(String),

    #[error("Failed to decode cache record: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, DiscernError>;
