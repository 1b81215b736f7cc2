use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Default scrape timeout must be positive")]
    InvalidDefaultTimeout,

    #[error("Attempt count must be at least 1: {field} = {value}")]
    InvalidAttemptCount { field: String, value: u32 },

    #[error("Engine timeout ({engine_ms}ms) exceeds default scrape timeout ({scrape_ms}ms)")]
    EngineTimeoutExceedsScrapeTimeout { engine_ms: u64, scrape_ms: u64 },

    #[error("Engine timeout must be positive when set")]
    InvalidEngineTimeout,

    #[error("Engine declared with an empty name")]
    EmptyEngineName,

    #[error("Engine '{engine}' declares feature '{feature}' more than once")]
    DuplicateEngineFeature { engine: String, feature: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_scrape(config)?;
    validate_engines(config)?;
    Ok(())
}

fn validate_scrape(config: &Config) -> Result<(), ValidationError> {
    let scrape = &config.scrape;

    if scrape.default_timeout.is_zero() {
        return Err(ValidationError::InvalidDefaultTimeout);
    }

    if scrape.max_attempts == 0 {
        return Err(ValidationError::InvalidAttemptCount {
            field: "max_attempts".to_string(),
            value: 0,
        });
    }

    if scrape.crawl_max_attempts == 0 {
        return Err(ValidationError::InvalidAttemptCount {
            field: "crawl_max_attempts".to_string(),
            value: 0,
        });
    }

    if let Some(engine_timeout) = scrape.engine_timeout {
        if engine_timeout.is_zero() {
            return Err(ValidationError::InvalidEngineTimeout);
        }
        if engine_timeout > scrape.default_timeout {
            return Err(ValidationError::EngineTimeoutExceedsScrapeTimeout {
                engine_ms: engine_timeout.as_millis(),
                scrape_ms: scrape.default_timeout.as_millis(),
            });
        }
    }

    // A zero waterfall buffer is legal: engines then launch on their
    // declared max-reasonable-time alone.

    Ok(())
}

fn validate_engines(config: &Config) -> Result<(), ValidationError> {
    for (name, engine) in &config.engines {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyEngineName);
        }

        let mut seen = Vec::with_capacity(engine.features.len());
        for feature in &engine.features {
            if seen.contains(feature) {
                return Err(ValidationError::DuplicateEngineFeature {
                    engine: name.clone(),
                    feature: feature.to_string(),
                });
            }
            seen.push(*feature);
        }

        if engine.max_reasonable_time.is_zero() {
            tracing::warn!(
                engine = %name,
                "Engine has a zero max_reasonable_time; the next engine will launch immediately"
            );
        }
    }

    Ok(())
}
