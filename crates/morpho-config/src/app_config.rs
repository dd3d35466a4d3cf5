//! Application configuration structures.

use morpho_core::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Job engine configuration.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, testing, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "morpho".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Job engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Number of worker threads. `0` picks the logical processor count.
    #[serde(default)]
    pub worker_count: usize,

    /// Prefix for worker thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// How long a caller waits for workers on shutdown, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Write the completion summary to the job context log.
    #[serde(default = "default_log_summary")]
    pub log_summary: bool,
}

fn default_thread_name_prefix() -> String {
    "morpho-worker".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_log_summary() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_count: 0,
            thread_name_prefix: default_thread_name_prefix(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            log_summary: default_log_summary(),
        }
    }
}

impl EngineSettings {
    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Resolves `worker_count`, substituting the processor count for `0`.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        } else {
            self.worker_count
        }
    }
}
