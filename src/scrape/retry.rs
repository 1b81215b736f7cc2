//! Feature-adjustment loop around the scheduler.
//!
//! Engines can ask for the scrape to be restarted with flags added or removed.
//! Each restart rebuilds the fallback list from the adjusted feature set and
//! runs the scheduler again. Everything else an engine can report is either
//! handled inside the scheduler or ends the scrape.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::engines::{EngineRegistry, PdfPrefetch};
use crate::features::{FeatureFlag, FeatureSet};
use crate::observability::Metrics;

use super::error::ScrapeError;
use super::fallback::build_fallback_list;
use super::meta::ScrapeMeta;
use super::scheduler::{EngineWin, Scheduler, SchedulerError};

pub async fn scrape_with_feature_retries(
    scheduler: &Scheduler,
    registry: &EngineRegistry,
    metrics: &Metrics,
    meta: &mut ScrapeMeta,
) -> Result<EngineWin, ScrapeError> {
    loop {
        meta.check_abort()?;

        let fallback = build_fallback_list(
            registry,
            &meta.features,
            meta.internal.force_engine.as_deref(),
        );

        let adjustment = match scheduler.run(meta, fallback).await {
            Ok(win) => return Ok(win),
            Err(SchedulerError::Fatal(ScrapeError::PdfAntibot)) => pdf_antibot_adjustment(meta)?,
            Err(SchedulerError::Fatal(error)) => return Err(error),
            Err(SchedulerError::AddFeature {
                flags,
                pdf_prefetch,
            }) => Adjustment::Add {
                flags,
                pdf_prefetch,
            },
            Err(SchedulerError::RemoveFeature { flags }) => Adjustment::Remove { flags },
        };

        if meta.is_forced() {
            let flags = adjustment.flags().clone();
            info!(flags = %flags, "Engines are forced, refusing feature adjustment");
            return Err(ScrapeError::ForcedEngineFeatureMismatch { flags });
        }

        adjustment.apply(meta)?;
        metrics.feature_restart();
        info!(features = %meta.features, "Restarting scrape with adjusted features");
    }
}

enum Adjustment {
    Add {
        flags: FeatureSet,
        pdf_prefetch: Option<PdfPrefetch>,
    },
    Remove {
        flags: FeatureSet,
    },
}

impl Adjustment {
    fn flags(&self) -> &FeatureSet {
        match self {
            Adjustment::Add { flags, .. } | Adjustment::Remove { flags } => flags,
        }
    }

    /// Apply to the scrape state. An adjustment that changes nothing would
    /// replay the same run, so it ends the scrape instead.
    fn apply(self, meta: &mut ScrapeMeta) -> Result<(), ScrapeError> {
        let before = meta.features.clone();

        let (flags, new_prefetch) = match self {
            Adjustment::Add {
                flags,
                pdf_prefetch,
            } => {
                meta.features.extend_from(&flags);
                let new_prefetch = pdf_prefetch.is_some();
                if let Some(prefetch) = pdf_prefetch {
                    debug!(
                        url = %prefetch.url,
                        bytes = prefetch.content.len(),
                        "Stored prefetched PDF"
                    );
                    meta.pdf_prefetch = Some(Arc::new(prefetch));
                }
                (flags, new_prefetch)
            }
            Adjustment::Remove { flags } => {
                meta.features.remove_all(&flags);
                (flags, false)
            }
        };

        if meta.features == before && !new_prefetch {
            return Err(ScrapeError::FeatureAdjustmentStalled { flags });
        }
        Ok(())
    }
}

/// A PDF engine was blocked. The first time, drop the pdf flag so a
/// rendering engine can fetch the file; if the file was already fetched
/// that way and is still blocked there is nothing left to try.
fn pdf_antibot_adjustment(meta: &ScrapeMeta) -> Result<Adjustment, ScrapeError> {
    if meta.pdf_prefetch.is_some() {
        error!("Prefetched PDF was blocked by anti-bot protection again");
        return Err(ScrapeError::PdfAntibot);
    }
    if !meta.features.contains(FeatureFlag::Pdf) {
        return Err(ScrapeError::PdfAntibot);
    }

    debug!("PDF blocked by anti-bot protection, retrying through a rendering engine");
    Ok(Adjustment::Remove {
        flags: FeatureSet::from([FeatureFlag::Pdf]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ExtractionOptions, MarkdownConverter};
    use crate::engines::{Engine, EngineContext, EngineError, EngineResult, EngineSpec};
    use crate::options::{InternalOptions, ScrapeOptions};
    use crate::scrape::evaluator::SuccessEvaluator;
    use crate::scrape::scheduler::SchedulerConfig;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    struct Echo;

    #[async_trait]
    impl MarkdownConverter for Echo {
        async fn to_markdown(&self, html: &str, _url: &Url, _options: &ExtractionOptions) -> String {
            html.to_string()
        }
    }

    /// Asks for stealth unless the attempt already has it.
    struct NeedsStealth {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Engine for NeedsStealth {
        async fn scrape(&self, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ctx.features.contains(FeatureFlag::StealthProxy) {
                Ok(EngineResult::new(ctx.url.as_str(), 200, "welcome"))
            } else {
                Err(EngineError::add_feature([FeatureFlag::StealthProxy]))
            }
        }
    }

    struct AlwaysAdds;

    #[async_trait]
    impl Engine for AlwaysAdds {
        async fn scrape(&self, _ctx: &EngineContext) -> Result<EngineResult, EngineError> {
            Err(EngineError::add_feature([FeatureFlag::Mobile]))
        }
    }

    struct PdfEngine;

    #[async_trait]
    impl Engine for PdfEngine {
        async fn scrape(&self, _ctx: &EngineContext) -> Result<EngineResult, EngineError> {
            Err(EngineError::PdfAntibot)
        }
    }

    struct PrefetchingBrowser;

    #[async_trait]
    impl Engine for PrefetchingBrowser {
        async fn scrape(&self, ctx: &EngineContext) -> Result<EngineResult, EngineError> {
            Err(EngineError::AddFeature {
                flags: FeatureSet::from([FeatureFlag::Pdf]),
                pdf_prefetch: Some(PdfPrefetch {
                    url: ctx.url.to_string(),
                    status_code: 200,
                    content_type: Some("application/pdf".to_string()),
                    content: Bytes::from_static(b"%PDF-1.7"),
                }),
            })
        }
    }

    fn scheduler(metrics: &Arc<Metrics>) -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(SuccessEvaluator::new(Arc::new(Echo))),
            Arc::clone(metrics),
        )
    }

    fn meta(url: &str, internal: InternalOptions) -> ScrapeMeta {
        ScrapeMeta::new(
            "s-1",
            Url::parse(url).unwrap(),
            Arc::new(ScrapeOptions::default()),
            Arc::new(internal),
            Duration::from_secs(60),
        )
    }

    fn spec(name: &str, quality: i32, features: &[FeatureFlag]) -> EngineSpec {
        EngineSpec::builder()
            .name(name)
            .quality(quality)
            .features(features.iter().copied().collect())
            .build()
    }

    #[tokio::test]
    async fn test_add_feature_restarts_with_flag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = EngineRegistry::new();
        registry.register(
            spec("browser", 10, &[FeatureFlag::StealthProxy]),
            Arc::new(NeedsStealth {
                calls: Arc::clone(&calls),
            }),
        );

        let metrics = Arc::new(Metrics::new());
        let mut meta = meta("https://example.com", InternalOptions::default());

        let win = scrape_with_feature_retries(&scheduler(&metrics), &registry, &metrics, &mut meta)
            .await
            .unwrap();

        assert_eq!(win.result.html, "welcome");
        assert!(meta.features.contains(FeatureFlag::StealthProxy));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.snapshot().feature_restarts, 1);
    }

    #[tokio::test]
    async fn test_forced_engine_rejects_adjustment() {
        let mut registry = EngineRegistry::new();
        registry.register(
            spec("browser", 10, &[FeatureFlag::StealthProxy]),
            Arc::new(NeedsStealth {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        let metrics = Arc::new(Metrics::new());
        let internal = InternalOptions::builder()
            .force_engine(vec!["browser".to_string()])
            .build();
        let mut meta = meta("https://example.com", internal);

        let result =
            scrape_with_feature_retries(&scheduler(&metrics), &registry, &metrics, &mut meta).await;
        assert!(matches!(
            result,
            Err(ScrapeError::ForcedEngineFeatureMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_repeated_adjustment_is_terminal() {
        let mut registry = EngineRegistry::new();
        registry.register(spec("mobile", 10, &[FeatureFlag::Mobile]), Arc::new(AlwaysAdds));

        let metrics = Arc::new(Metrics::new());
        let mut meta = meta("https://example.com", InternalOptions::default());

        let result =
            scrape_with_feature_retries(&scheduler(&metrics), &registry, &metrics, &mut meta).await;
        assert!(matches!(
            result,
            Err(ScrapeError::FeatureAdjustmentStalled { .. })
        ));
        assert_eq!(metrics.snapshot().feature_restarts, 1);
    }

    #[tokio::test]
    async fn test_pdf_antibot_prefetch_then_fatal() {
        let mut registry = EngineRegistry::new();
        registry.register(spec("pdf", -20, &[FeatureFlag::Pdf]), Arc::new(PdfEngine));
        registry.register(spec("browser", 5, &[]), Arc::new(PrefetchingBrowser));

        let metrics = Arc::new(Metrics::new());
        let mut meta = meta("https://example.com/paper.pdf", InternalOptions::default());
        assert!(meta.features.contains(FeatureFlag::Pdf));

        let result =
            scrape_with_feature_retries(&scheduler(&metrics), &registry, &metrics, &mut meta).await;

        assert!(matches!(result, Err(ScrapeError::PdfAntibot)));
        assert!(meta.pdf_prefetch.is_some());
        assert_eq!(metrics.snapshot().feature_restarts, 2);
    }
}
