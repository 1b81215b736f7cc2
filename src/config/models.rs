use crate::features::FeatureFlag;
use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default whole-scrape timeout when the caller sets none (300,000 ms)
pub const DEFAULT_SCRAPE_TIMEOUT: HumanDuration = HumanDuration::from_secs(300);

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scrape: ScrapeConfig,
    /// Engine declarations keyed by engine name
    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Orchestration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeConfig {
    /// Timeout applied when a request does not carry its own
    #[serde(default = "default_timeout")]
    pub default_timeout: HumanDuration,
    /// Extra time added to an engine's max-reasonable-time before the next
    /// engine in the waterfall is launched
    #[serde(default)]
    pub waterfall_buffer: HumanDuration,
    /// Optional hard deadline for each individual engine attempt
    #[serde(default)]
    pub engine_timeout: Option<HumanDuration>,
    /// Pipeline runs for standalone scrapes
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pipeline runs for scrapes that belong to a crawl
    #[serde(default = "default_crawl_max_attempts")]
    pub crawl_max_attempts: u32,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            waterfall_buffer: HumanDuration::default(),
            engine_timeout: None,
            max_attempts: default_max_attempts(),
            crawl_max_attempts: default_crawl_max_attempts(),
        }
    }
}

fn default_timeout() -> HumanDuration {
    DEFAULT_SCRAPE_TIMEOUT
}

fn default_max_attempts() -> u32 {
    1
}

fn default_crawl_max_attempts() -> u32 {
    3
}

/// Engine capability declaration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub quality: i32,
    #[serde(default = "default_max_reasonable_time")]
    pub max_reasonable_time: HumanDuration,
    #[serde(default)]
    pub features: Vec<FeatureFlag>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality: 0,
            max_reasonable_time: default_max_reasonable_time(),
            features: Vec::new(),
            enabled: default_enabled(),
        }
    }
}

fn default_max_reasonable_time() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_enabled() -> bool {
    true
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scrape.default_timeout.as_millis(), 300_000);
        assert!(config.scrape.waterfall_buffer.is_zero());
        assert_eq!(config.scrape.max_attempts, 1);
        assert_eq!(config.scrape.crawl_max_attempts, 3);
        assert!(config.engines.is_empty());
        assert_eq!(config.telemetry.log_filter, "info");
    }

    #[test]
    fn test_engine_config_from_toml() {
        let engine: EngineConfig = toml::from_str(
            r#"
quality = 50
max_reasonable_time = "20s"
features = ["screenshot", "actions", "stealth_proxy"]
            "#,
        )
        .unwrap();

        assert_eq!(engine.quality, 50);
        assert_eq!(engine.max_reasonable_time.as_millis(), 20_000);
        assert_eq!(engine.features.len(), 3);
        assert!(engine.enabled);
    }
}
