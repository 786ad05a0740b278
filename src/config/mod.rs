//! Configuration management for chemfetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use chemfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Proxy pool: {}", config.proxy.pool_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `CHEMFETCH__<section>__<key>`
//!
//! Examples:
//! - `CHEMFETCH__PROXY__POOL_URL=http://pool.internal:5010`
//! - `CHEMFETCH__FETCH__MAX_ATTEMPTS=5`
//! - `CHEMFETCH__BATCH__ORDER=completion`
//! - `CHEMFETCH__PROXY__STATIC=10.0.0.1:3128,10.0.0.2:3128`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/chemfetch.toml`.
//! This can be overridden using the `CHEMFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{ApiConfig, BatchConfig, Config, FetchConfig, ProxyConfig};
pub use sources::default_path;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// The file must exist; `.env` and environment overrides still apply.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self> {
        let config = sources::load_explicit(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
