//! Configuration validation module.
//!
//! Collects every problem in one pass so a bad config file is reported
//! in full rather than one error at a time.

use crate::AppConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Worker count exceeds the supported maximum.
    TooManyWorkers { value: usize, maximum: usize },
    /// Worker thread name prefix is empty.
    EmptyThreadNamePrefix,
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Log filter directive is empty.
    EmptyLogFilter,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyWorkers { value, maximum } => {
                write!(f, "Worker count {} exceeds maximum allowed ({})", value, maximum)
            }
            Self::EmptyThreadNamePrefix => {
                write!(f, "Worker thread name prefix cannot be empty")
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::EmptyLogFilter => {
                write!(f, "Log filter cannot be empty")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Upper bound on worker threads.
    const MAX_WORKERS: usize = 1024;

    /// Validates the entire application configuration.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::new();

        Self::validate_engine(&config.engine, &mut result);
        Self::validate_telemetry(&config.telemetry, &mut result);

        result.into_result()
    }

    fn validate_engine(config: &crate::EngineSettings, result: &mut ValidationResult) {
        if config.worker_count > Self::MAX_WORKERS {
            result.add_error(ConfigValidationError::TooManyWorkers {
                value: config.worker_count,
                maximum: Self::MAX_WORKERS,
            });
        }

        if config.thread_name_prefix.trim().is_empty() {
            result.add_error(ConfigValidationError::EmptyThreadNamePrefix);
        }

        if config.shutdown_timeout_ms == 0 {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "shutdown_timeout_ms".to_string(),
                value: 0,
            });
        }
    }

    fn validate_telemetry(config: &morpho_core::TelemetryConfig, result: &mut ValidationResult) {
        if config.console_output && config.filter.trim().is_empty() {
            result.add_error(ConfigValidationError::EmptyLogFilter);
        }
    }
}
