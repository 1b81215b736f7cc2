//! Scrapebox settings
//!
//! Values are resolved in three layers, later ones winning: struct defaults,
//! the TOML file, then environment variables.
//!
//! ```no_run
//! use scrapebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Default timeout: {}", config.scrape.default_timeout);
//! ```
//!
//! Environment overrides use `SCRAPEBOX__<section>__<key>`, for example
//! `SCRAPEBOX__SCRAPE__WATERFALL_BUFFER=500ms` or
//! `SCRAPEBOX__TELEMETRY__LOG_FILTER=scrapebox=debug`.
//!
//! The file defaults to `config/scrapebox.toml`; set `SCRAPEBOX_CONFIG` to
//! point somewhere else.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, DEFAULT_SCRAPE_TIMEOUT, EngineConfig, ScrapeConfig, TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load from file and environment, then validate.
    ///
    /// Fails on a malformed file, unknown feature names or values that do
    /// not pass validation (zero timeouts, zero attempt counts and so on).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Same as [`Config::load`] with an explicit file path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration built in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
