//! Tracing setup.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a console
//! layer, either human readable or JSON.

#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::MorphoResult;
use serde::{Deserialize, Serialize};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether to install a console subscriber at all.
    #[serde(default = "default_console_output")]
    pub console_output: bool,

    /// Emit JSON lines instead of the human readable format.
    #[serde(default)]
    pub json: bool,

    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Include the worker thread name on every event.
    #[serde(default = "default_thread_names")]
    pub thread_names: bool,
}

fn default_console_output() -> bool {
    true
}

fn default_filter() -> String {
    "info,morpho=debug".to_string()
}

fn default_thread_names() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            console_output: default_console_output(),
            json: false,
            filter: default_filter(),
            thread_names: default_thread_names(),
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// Fails if a global subscriber is already installed.
#[cfg(feature = "telemetry")]
pub fn init_telemetry(config: &TelemetryConfig) -> MorphoResult<()> {
    if !config.console_output {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| crate::MorphoError::Configuration(format!("Invalid log filter: {}", e)))?;

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(config.thread_names),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(config.thread_names),
            )
            .try_init()
    };

    result.map_err(|e| crate::MorphoError::Internal(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(
        filter = %config.filter,
        json = config.json,
        "Telemetry initialized"
    );

    Ok(())
}

/// Placeholder for when telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_telemetry(_config: &TelemetryConfig) -> MorphoResult<()> {
    Ok(())
}
