//! Configuration management for jobwatch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use jobwatch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Polling every {}", config.controller.poll_interval);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `JOBWATCH__<section>__<key>`
//!
//! Examples:
//! - `JOBWATCH__REMOTE__BASE_URL=https://jobs.example.com`
//! - `JOBWATCH__CONTROLLER__POLL_INTERVAL=500ms`
//! - `JOBWATCH__TELEMETRY__LOG_FILTER=jobwatch=debug`
//!
//! The API token is only read from `JOBWATCH_API_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/jobwatch.toml`.
//! This can be overridden using the `JOBWATCH_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, ControllerConfig, HttpSettings, RemoteConfig, TelemetryConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

use crate::controller::ControllerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`JOBWATCH__*`)
    /// 2. TOML file (default: `config/jobwatch.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_override(None)
    }

    /// Like [`Config::load`], with an explicit file path taking precedence
    /// over `JOBWATCH_CONFIG`.
    pub fn load_with_override(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Controller settings derived from the `[controller]` section
    pub fn controller_settings(&self) -> ControllerSettings {
        let call_timeout = self.controller.call_timeout.as_duration();
        ControllerSettings {
            poll_interval: self.controller.poll_interval.as_duration(),
            call_timeout: (!call_timeout.is_zero()).then_some(call_timeout),
            event_buffer: self.controller.event_buffer,
        }
    }

    /// Effective configuration as TOML (secrets omitted)
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
