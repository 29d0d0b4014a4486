//! Tracing subscriber setup for hosts embedding the orchestrator.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::DiscernError;

/// Builds the level filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter, DiscernError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| DiscernError::Telemetry(format!("invalid log level '{}': {}", level, e))),
    }
}

/// Installs the global tracing subscriber and bridges `log` records into it.
///
/// Fails if a subscriber or logger is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), DiscernError> {
    let filter = build_filter(&config.level)?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json().with_target(true)))
        .with((!config.json).then(|| fmt::layer().with_target(true)));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DiscernError::Telemetry(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| DiscernError::Telemetry(e.to_string()))?;

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}
