//! API key resolution for the analysis service.
//!
//! A key can come from three places, checked in this order:
//!
//! 1. **Direct value** - `api_key: "sk-..."`, for quick local testing
//! 2. **File reference** - `api_key_file: /run/secrets/discern_key`, for Docker secrets
//! 3. **Env var reference** - `api_key_env_var: DISCERN_API_KEY`, for production
//!
//! No configured source is not an error: the service may run without auth.

use secrecy::SecretString;
use std::fs;

use crate::config::ApiConfig;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Failed to read secret from file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// The places a single secret may be configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecretSource<'a> {
    pub direct: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn from_api_config(api: &'a ApiConfig) -> Self {
        Self {
            direct: api.api_key.as_deref(),
            file_path: api.api_key_file.as_deref(),
            env_var: api.api_key_env_var.as_deref(),
        }
    }

    /// Resolves the secret, or `None` when no source is configured.
    pub fn resolve(&self) -> Result<Option<SecretString>> {
        if let Some(value) = non_empty(self.direct) {
            return Ok(Some(SecretString::from(value.to_string())));
        }

        if let Some(path) = non_empty(self.file_path) {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileRead {
                path: expanded.clone(),
                source: e,
            })?;
            return trimmed_secret(&content, &format!("file '{}'", expanded)).map(Some);
        }

        if let Some(name) = non_empty(self.env_var) {
            return match std::env::var(name) {
                Ok(value) => trimmed_secret(&value, &format!("env var '{}'", name)).map(Some),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Ok(None)
    }
}

/// Resolves the analysis service API key from the `api` config section.
pub fn resolve_api_key(api: &ApiConfig) -> Result<Option<SecretString>> {
    SecretSource::from_api_config(api).resolve()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn trimmed_secret(raw: &str, origin: &str) -> Result<SecretString> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SecretError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(SecretString::from(trimmed.to_string()))
}

/// Expands a leading `~` to the user's home directory (HOME, then USERPROFILE).
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
