//! Scrape orchestration for scrapebox
//!
//! Takes one URL and a set of options and drives the registered engines
//! until one of them produces an acceptable result, then turns that result
//! into a [`Document`].
//!
//! ## Pipeline
//!
//! 1. Resolve feature flags from the request ([`crate::features`])
//! 2. Build the fallback list ([`build_fallback_list`])
//! 3. Race the list with waterfall pacing ([`Scheduler`])
//! 4. On feature adjustments, go back to 2
//! 5. Postprocess the winning result, build the document, run transformers
//!
//! Crawl scrapes wrap the whole pipeline in a bounded retry that repeats
//! while the page answers with a bad status.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scrapebox::{Config, Scraper, ScrapeOptions, InternalOptions};
//!
//! let scraper = Scraper::builder()
//!     .config(config.scrape.clone())
//!     .registry(registry)
//!     .converter(Arc::new(MyConverter))
//!     .build();
//!
//! let document = scraper
//!     .scrape_url("job-1", "https://example.com", ScrapeOptions::default(), InternalOptions::default())
//!     .await?;
//! ```

mod error;
mod evaluator;
mod fallback;
mod meta;
mod postprocess;
mod retry;
mod scheduler;
mod transform;

pub use error::{AttemptOutcome, EngineFailure, ScrapeError};
pub use evaluator::{SuccessEvaluator, Verdict};
pub use fallback::{FallbackEntry, build_fallback_list};
pub use meta::ScrapeMeta;
pub use postprocess::{PostprocessError, Postprocessor};
pub use scheduler::{EngineWin, Scheduler, SchedulerConfig, SchedulerError};
pub use transform::{FormatCoercion, Transformer};

use bon::bon;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{Config, ScrapeConfig};
use crate::convert::MarkdownConverter;
use crate::document::Document;
use crate::engines::EngineRegistry;
use crate::observability::Metrics;
use crate::options::{InternalOptions, ScrapeOptions};

/// Time-ordered id for a scrape that has none of its own
pub fn new_scrape_id() -> String {
    Uuid::now_v7().to_string()
}

/// Entry point for scraping a single URL
pub struct Scraper {
    config: ScrapeConfig,
    registry: EngineRegistry,
    converter: Arc<dyn MarkdownConverter>,
    postprocessors: Vec<Arc<dyn Postprocessor>>,
    transformers: Vec<Arc<dyn Transformer>>,
    scheduler: Scheduler,
    metrics: Arc<Metrics>,
}

#[bon]
impl Scraper {
    /// `transformers` run in order, followed by [`FormatCoercion`].
    #[builder]
    pub fn new(
        #[builder(default)] config: ScrapeConfig,
        registry: EngineRegistry,
        converter: Arc<dyn MarkdownConverter>,
        #[builder(default)] postprocessors: Vec<Arc<dyn Postprocessor>>,
        #[builder(default)] transformers: Vec<Arc<dyn Transformer>>,
        #[builder(default)] metrics: Arc<Metrics>,
    ) -> Self {
        let mut transformers = transformers;
        transformers.push(Arc::new(FormatCoercion));

        let scheduler = Scheduler::new(
            SchedulerConfig::from(&config),
            Arc::new(SuccessEvaluator::new(Arc::clone(&converter))),
            Arc::clone(&metrics),
        );

        Self {
            config,
            registry,
            converter,
            postprocessors,
            transformers,
            scheduler,
            metrics,
        }
    }

    /// Build from loaded configuration, applying engine overrides to `registry`.
    pub fn from_config(
        config: &Config,
        mut registry: EngineRegistry,
        converter: Arc<dyn MarkdownConverter>,
    ) -> Self {
        registry.apply_config(&config.engines);
        Self::builder()
            .config(config.scrape.clone())
            .registry(registry)
            .converter(converter)
            .build()
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Scrape `url` into a document.
    ///
    /// Scrapes that belong to a crawl are repeated (up to
    /// `crawl_max_attempts` runs) while the page answers with a status
    /// outside 2xx/304; the last document is returned either way. A retry
    /// that fails outright hands back the document from the run before it.
    pub async fn scrape_url(
        &self,
        id: &str,
        url: &str,
        options: ScrapeOptions,
        internal: InternalOptions,
    ) -> Result<Document, ScrapeError> {
        let span = info_span!("scrape", scrape_id = %id, url = %url);

        async move {
            self.metrics.scrape_started();
            let outcome = self.scrape_with_retries(id, url, options, internal).await;

            match &outcome {
                Ok(document) => {
                    self.metrics.scrape_succeeded();
                    info!(
                        engine = %document.metadata.engine,
                        status_code = document.status_code(),
                        "Scrape finished"
                    );
                }
                Err(e) => {
                    self.metrics.scrape_failed();
                    error!(error = %e, "Scrape failed");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn scrape_with_retries(
        &self,
        id: &str,
        url: &str,
        options: ScrapeOptions,
        internal: InternalOptions,
    ) -> Result<Document, ScrapeError> {
        let url = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl(format!("{url}: {e}")))?;
        let options = Arc::new(options);
        let internal = Arc::new(internal);

        let max_attempts = if internal.is_crawl() {
            self.config.crawl_max_attempts
        } else {
            self.config.max_attempts
        }
        .max(1);

        let mut attempt = 1;
        let mut previous: Option<Document> = None;
        loop {
            let outcome = self
                .run_pipeline(id, &url, Arc::clone(&options), Arc::clone(&internal))
                .await;

            let document = match (outcome, previous.take()) {
                (Ok(document), _) => document,
                (Err(e), Some(previous)) => {
                    warn!(
                        attempt,
                        error = %e,
                        status_code = previous.status_code(),
                        "Retry failed, returning the previous document"
                    );
                    return Ok(previous);
                }
                (Err(e), None) => return Err(e),
            };

            if document.has_good_status() || attempt >= max_attempts {
                return Ok(document);
            }

            warn!(
                attempt,
                max_attempts,
                status_code = document.status_code(),
                "Page answered with a bad status, retrying"
            );
            self.metrics.outer_retry();
            previous = Some(document);
            attempt += 1;
        }
    }

    async fn run_pipeline(
        &self,
        id: &str,
        url: &Url,
        options: Arc<ScrapeOptions>,
        internal: Arc<InternalOptions>,
    ) -> Result<Document, ScrapeError> {
        let mut meta = ScrapeMeta::new(
            id,
            url.clone(),
            options,
            internal,
            self.config.default_timeout.as_duration(),
        );
        info!(
            features = %meta.features,
            timeout_ms = meta.timeout().as_millis() as u64,
            "Starting scrape pipeline"
        );

        let win = retry::scrape_with_feature_retries(
            &self.scheduler,
            &self.registry,
            &self.metrics,
            &mut meta,
        )
        .await?;

        let result = postprocess::run_postprocessors(&self.postprocessors, &meta, win.result).await;
        let document = transform::build_document(
            self.converter.as_ref(),
            &meta,
            &win.engine,
            &win.unsupported_features,
            result,
        )
        .await;

        transform::run_transformers(&self.transformers, &meta, document).await
    }
}
