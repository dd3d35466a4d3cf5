//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use morpho_core::MorphoError;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable selecting the environment-specific config file.
pub const ENVIRONMENT_VAR: &str = "MORPHO_ENVIRONMENT";

/// Prefix for environment variable overrides, e.g. `MORPHO__ENGINE__WORKER_COUNT`.
pub const ENV_PREFIX: &str = "MORPHO";

/// Configuration loader with runtime reload support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
    environment: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{config_dir}/default.toml` - Default values
    /// 2. `{config_dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{config_dir}/local.toml` - Uncommitted local overrides
    /// 4. Environment variables with `MORPHO__` prefix
    ///
    /// The environment name comes from `MORPHO_ENVIRONMENT` and defaults to
    /// `development`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, MorphoError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::with_environment(config_dir, environment)
    }

    /// Creates a loader for an explicitly named environment.
    pub fn with_environment(
        config_dir: impl Into<PathBuf>,
        environment: impl Into<String>,
    ) -> Result<Self, MorphoError> {
        let config_dir = config_dir.into();
        let environment = environment.into();
        let config = Self::load_config(&config_dir, &environment)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            environment,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, MorphoError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Returns the environment name this loader was created for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the directory configuration files are read from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Reloads the configuration from disk.
    ///
    /// On failure the previously loaded configuration stays in place.
    pub fn reload(&self) -> Result<(), MorphoError> {
        let new_config = Self::load_config(&self.config_dir, &self.environment)?;
        *self.config.write() = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &Path, environment: &str) -> Result<AppConfig, MorphoError> {
        info!(
            environment = %environment,
            config_dir = %config_dir.display(),
            "Loading configuration"
        );

        let mut builder = Config::builder();

        for name in ["default", environment, "local"] {
            let path = config_dir.join(format!("{}.toml", name));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_morpho_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_morpho_error)?;

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            MorphoError::Configuration(joined)
        })?;

        Ok(app_config)
    }

    /// Gets a specific configuration value by dotted key path.
    pub fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = serde_json::to_value(&*self.config.read()).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_morpho_error(err: ConfigError) -> MorphoError {
    MorphoError::Configuration(err.to_string())
}
