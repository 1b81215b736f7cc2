//! Observability: tracing setup and scrape counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Calling this more
/// than once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Metrics handle for recording scrape counters
#[derive(Debug, Default)]
pub struct Metrics {
    scrapes_started: AtomicU64,
    scrapes_succeeded: AtomicU64,
    scrapes_failed: AtomicU64,
    engine_attempts: AtomicU64,
    attempts_sniped: AtomicU64,
    feature_restarts: AtomicU64,
    outer_retries: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scrape_started(&self) {
        self.scrapes_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scrapes_started", "Metric incremented");
    }

    pub fn scrape_succeeded(&self) {
        self.scrapes_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scrapes_succeeded", "Metric incremented");
    }

    pub fn scrape_failed(&self) {
        self.scrapes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scrapes_failed", "Metric incremented");
    }

    pub fn engine_attempt(&self) {
        self.engine_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "engine_attempts", "Metric incremented");
    }

    pub fn attempts_sniped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.attempts_sniped.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "attempts_sniped", count, "Metric incremented");
    }

    pub fn feature_restart(&self) {
        self.feature_restarts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "feature_restarts", "Metric incremented");
    }

    pub fn outer_retry(&self) {
        self.outer_retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "outer_retries", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scrapes_started: self.scrapes_started.load(Ordering::Relaxed),
            scrapes_succeeded: self.scrapes_succeeded.load(Ordering::Relaxed),
            scrapes_failed: self.scrapes_failed.load(Ordering::Relaxed),
            engine_attempts: self.engine_attempts.load(Ordering::Relaxed),
            attempts_sniped: self.attempts_sniped.load(Ordering::Relaxed),
            feature_restarts: self.feature_restarts.load(Ordering::Relaxed),
            outer_retries: self.outer_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scrapes_started: u64,
    pub scrapes_succeeded: u64,
    pub scrapes_failed: u64,
    pub engine_attempts: u64,
    pub attempts_sniped: u64,
    pub feature_restarts: u64,
    pub outer_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let config = TelemetryConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.scrape_started();
        metrics.engine_attempt();
        metrics.engine_attempt();
        metrics.attempts_sniped(0);
        metrics.attempts_sniped(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scrapes_started, 1);
        assert_eq!(snapshot.engine_attempts, 2);
        assert_eq!(snapshot.attempts_sniped, 2);
        assert_eq!(snapshot.scrapes_failed, 0);
    }
}
