//! Job engine configuration.

use morpho_config::EngineSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`JobEngine`](crate::JobEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEngineConfig {
    /// Number of worker threads. `0` picks the logical processor count.
    #[serde(default)]
    pub worker_count: usize,

    /// Worker threads are named `{prefix}-{i}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// Write the completion summary to the job context when a job ends.
    #[serde(default = "default_log_summary")]
    pub log_summary: bool,

    /// Suggested bound for [`JobEngine::shutdown`](crate::JobEngine::shutdown).
    #[serde(default = "default_shutdown_timeout", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            thread_name_prefix: default_thread_name_prefix(),
            log_summary: default_log_summary(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

fn default_thread_name_prefix() -> String {
    "morpho-worker".to_string()
}

fn default_log_summary() -> bool {
    true
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

impl JobEngineConfig {
    /// Default configuration with a fixed worker count.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Enables or disables the completion summary.
    #[must_use]
    pub fn with_log_summary(mut self, log_summary: bool) -> Self {
        self.log_summary = log_summary;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Resolves `worker_count`, substituting the processor count for `0`.
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

impl From<&EngineSettings> for JobEngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            thread_name_prefix: settings.thread_name_prefix.clone(),
            log_summary: settings.log_summary,
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
