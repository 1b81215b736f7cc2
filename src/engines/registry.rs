use bon::Builder;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::traits::Engine;
use crate::config::EngineConfig;
use crate::features::{FeatureFlag, FeatureSet};
use crate::options::ScrapeOptions;

const DEFAULT_MAX_REASONABLE_TIME: Duration = Duration::from_secs(10);

/// Static capability declaration for an engine
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct EngineSpec {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub features: FeatureSet,
    /// Higher is tried first; engines at or below zero are last resorts
    #[builder(default)]
    pub quality: i32,
    #[builder(default = DEFAULT_MAX_REASONABLE_TIME)]
    pub max_reasonable_time: Duration,
}

impl EngineSpec {
    pub fn from_config(name: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            name: name.into(),
            features: config.features.iter().copied().collect(),
            quality: config.quality,
            max_reasonable_time: config.max_reasonable_time.as_duration(),
        }
    }

    pub fn supports(&self, flag: FeatureFlag) -> bool {
        self.features.contains(flag)
    }

    /// Declared estimate for this request in milliseconds.
    ///
    /// Engines that honor waits are expected to spend them, so the requested
    /// wait time and explicit wait actions are added on top of the base.
    pub fn estimate_max_reasonable_time_ms(&self, options: &ScrapeOptions) -> f64 {
        let mut estimate = self.max_reasonable_time.as_millis() as f64;

        if self.supports(FeatureFlag::WaitFor) {
            estimate += options.wait_for as f64;
        }
        if self.supports(FeatureFlag::Actions) {
            estimate += options
                .actions
                .iter()
                .map(|action| action.wait_millis() as f64)
                .sum::<f64>();
        }

        estimate
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("engine not found: {0}")]
    NotFound(String),
}

/// An engine together with its declaration
#[derive(Clone)]
pub struct RegisteredEngine {
    pub spec: EngineSpec,
    pub engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for RegisteredEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredEngine")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Registry of engines in registration order
///
/// Registration order is the final tie-breaker when the fallback list ranks
/// engines with equal support and quality.
#[derive(Clone, Debug, Default)]
pub struct EngineRegistry {
    entries: Vec<RegisteredEngine>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine. Re-registering a name replaces it in place.
    pub fn register(&mut self, spec: EngineSpec, engine: Arc<dyn Engine>) {
        let entry = RegisteredEngine { spec, engine };
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.spec.name == entry.spec.name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Result<&RegisteredEngine, RegistryError> {
        self.entries
            .iter()
            .find(|entry| entry.spec.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn has_engine(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEngine> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Override declarations from configuration.
    ///
    /// Configured engines replace the registered declaration; disabled
    /// engines are removed. Entries for engines this build does not
    /// provide are ignored.
    pub fn apply_config(&mut self, engines: &BTreeMap<String, EngineConfig>) {
        for (name, config) in engines {
            if !self.has_engine(name) {
                tracing::warn!(engine = %name, "Configured engine is not registered, ignoring");
                continue;
            }

            if !config.enabled {
                tracing::info!(engine = %name, "Engine disabled by configuration");
                self.entries.retain(|entry| &entry.spec.name != name);
                continue;
            }

            if let Some(entry) = self.entries.iter_mut().find(|e| &e.spec.name == name) {
                entry.spec = EngineSpec::from_config(name.clone(), config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{EngineContext, EngineError, EngineResult};
    use crate::humanize::HumanDuration;
    use crate::options::Action;
    use async_trait::async_trait;

    struct NoopEngine;

    #[async_trait]
    impl Engine for NoopEngine {
        async fn scrape(&self, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
            Ok(EngineResult::new(ctx.url.as_str(), 200, "<p>ok</p>"))
        }
    }

    fn spec(name: &str, quality: i32) -> EngineSpec {
        EngineSpec::builder().name(name).quality(quality).build()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = EngineRegistry::new();
        registry.register(spec("fetch", 5), Arc::new(NoopEngine));
        registry.register(spec("browser", 50), Arc::new(NoopEngine));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["fetch", "browser"]);
        assert_eq!(registry.get("browser").unwrap().spec.quality, 50);
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut registry = EngineRegistry::new();
        registry.register(spec("a", 1), Arc::new(NoopEngine));
        registry.register(spec("b", 1), Arc::new(NoopEngine));
        registry.register(spec("a", 9), Arc::new(NoopEngine));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().spec.quality, 9);
    }

    #[test]
    fn test_apply_config_overrides_and_disables() {
        let mut registry = EngineRegistry::new();
        registry.register(spec("fetch", 5), Arc::new(NoopEngine));
        registry.register(spec("browser", 50), Arc::new(NoopEngine));

        let mut engines = BTreeMap::new();
        engines.insert(
            "fetch".to_string(),
            EngineConfig {
                quality: 7,
                max_reasonable_time: HumanDuration::from_secs(3),
                features: vec![FeatureFlag::UseFastMode],
                enabled: true,
            },
        );
        engines.insert(
            "browser".to_string(),
            EngineConfig {
                enabled: false,
                ..EngineConfig::default()
            },
        );
        engines.insert("ghost".to_string(), EngineConfig::default());

        registry.apply_config(&engines);

        assert_eq!(registry.names(), vec!["fetch"]);
        let fetch = &registry.get("fetch").unwrap().spec;
        assert_eq!(fetch.quality, 7);
        assert_eq!(fetch.max_reasonable_time, Duration::from_secs(3));
        assert!(fetch.supports(FeatureFlag::UseFastMode));
    }

    #[test]
    fn test_estimate_adds_waits_for_capable_engines() {
        let options = ScrapeOptions::builder()
            .wait_for(1000)
            .actions(vec![Action::Wait {
                milliseconds: Some(500),
                selector: None,
            }])
            .build();

        let plain = EngineSpec::builder()
            .name("fetch")
            .max_reasonable_time(Duration::from_secs(2))
            .build();
        assert_eq!(plain.estimate_max_reasonable_time_ms(&options), 2000.0);

        let browser = EngineSpec::builder()
            .name("browser")
            .features([FeatureFlag::WaitFor, FeatureFlag::Actions].into())
            .max_reasonable_time(Duration::from_secs(2))
            .build();
        assert_eq!(browser.estimate_max_reasonable_time_ms(&options), 3500.0);
    }
}
