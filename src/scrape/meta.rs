use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::abort::{AbortError, AbortManager, AbortTier};
use crate::document::ProxyUsed;
use crate::engines::{EngineContext, PdfPrefetch};
use crate::features::{FeatureFlag, FeatureSet, resolve_feature_flags};
use crate::options::{InternalOptions, ScrapeOptions};

use super::error::ScrapeError;

/// State of one pipeline run.
///
/// Options are shared read-only; only `features` and `pdf_prefetch` change,
/// and only between scheduler runs.
#[derive(Debug, Clone)]
pub struct ScrapeMeta {
    pub id: String,
    pub url: Url,
    pub options: Arc<ScrapeOptions>,
    pub internal: Arc<InternalOptions>,
    pub features: FeatureSet,
    pub pdf_prefetch: Option<Arc<PdfPrefetch>>,
    /// Scrape-tier abort handle; engine attempts derive children from it
    pub abort: AbortManager,
    timeout: Duration,
}

impl ScrapeMeta {
    pub fn new(
        id: impl Into<String>,
        url: Url,
        options: Arc<ScrapeOptions>,
        internal: Arc<InternalOptions>,
        default_timeout: Duration,
    ) -> Self {
        let timeout = options
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);
        let features = resolve_feature_flags(&url, &options, &internal);
        let abort = AbortManager::new(internal.abort.clone(), timeout);

        Self {
            id: id.into(),
            url,
            options,
            internal,
            features,
            pdf_prefetch: None,
            abort,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_forced(&self) -> bool {
        self.internal.force_engine.is_some()
    }

    pub fn proxy_used(&self) -> ProxyUsed {
        if self.features.contains(FeatureFlag::StealthProxy) {
            ProxyUsed::Stealth
        } else {
            ProxyUsed::Basic
        }
    }

    /// Snapshot handed to one engine attempt
    pub fn engine_context(&self, abort: AbortManager) -> EngineContext {
        EngineContext {
            scrape_id: self.id.clone(),
            url: self.url.clone(),
            options: Arc::clone(&self.options),
            internal: Arc::clone(&self.internal),
            features: self.features.clone(),
            pdf_prefetch: self.pdf_prefetch.clone(),
            abort,
        }
    }

    /// Map a fired abort level above the engine tier to the caller-facing error.
    pub fn abort_error(&self, error: AbortError) -> ScrapeError {
        match error.tier {
            AbortTier::External => ScrapeError::Cancelled,
            AbortTier::Scrape | AbortTier::Engine => ScrapeError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
                caller_specified: self.options.timeout.is_some(),
            },
        }
    }

    pub fn check_abort(&self) -> Result<(), ScrapeError> {
        self.abort
            .throw_if_aborted()
            .map_err(|error| self.abort_error(error))
    }
}
