//! Tracing subscriber setup for binaries and tests driving a loader

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Output format of log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,

    /// Single-line human readable output
    #[default]
    Compact,

    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Event format
    pub format: LogFormat,

    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `ml_bridge_loader=debug`
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            default_filter: "info".to_string(),
        }
    }
}

/// Install a global subscriber with the default configuration
pub fn init() -> Result<()> {
    init_with_config(&LoggingConfig::default())
}

/// Install a global subscriber
///
/// `RUST_LOG` takes precedence over `config.default_filter`. Fails if a
/// global subscriber is already installed.
pub fn init_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| Error::Logging(format!("invalid filter '{}': {e}", config.default_filter)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_thread_names(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    installed.map_err(|e| Error::Logging(e.to_string()))?;

    tracing::debug!(format = ?config.format, "logging initialized");
    Ok(())
}
