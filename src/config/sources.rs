//! Where scrapebox configuration comes from.
//!
//! Sources are merged in this order, later ones overriding earlier ones:
//!
//! 1. `#[serde(default)]` values on the config structs
//! 2. The TOML file at `SCRAPEBOX_CONFIG`, or `config/scrapebox.toml`
//! 3. Variables from a `.env` file in the working directory
//! 4. Process environment variables
//!
//! Environment keys use `SCRAPEBOX` as prefix and `__` between path
//! segments, so `SCRAPEBOX__SCRAPE__DEFAULT_TIMEOUT=90s` sets
//! `scrape.default_timeout` and `SCRAPEBOX__ENGINES__FETCH__QUALITY=20`
//! sets `engines.fetch.quality`.

use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

/// Overrides the config file location
const CONFIG_ENV_VAR: &str = "SCRAPEBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/scrapebox.toml";
const ENV_PREFIX: &str = "SCRAPEBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration for this process.
///
/// Reads `.env` first so that `SCRAPEBOX_CONFIG` and every override it
/// declares are visible to the environment source.
pub fn load() -> Result<Config, ConfigError> {
    // no .env is the normal case in production
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Merge struct defaults, the TOML file at `config_path` and the
/// environment. A missing file only logs a warning; engines and timeouts
/// then come from defaults and `SCRAPEBOX__*` variables alone.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading scrape configuration");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "Scrape configuration file not found, using defaults and environment"
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
