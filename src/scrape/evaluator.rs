//! Decides whether an engine result is good enough to end the race.

use std::sync::Arc;
use url::Url;

use crate::convert::{ExtractionOptions, MarkdownConverter};
use crate::document::is_good_status;
use crate::engines::{EngineContext, EngineResult};
use crate::features::{FeatureFlag, FeatureSet};
use crate::options::ProxyMode;

/// Statuses that suggest the request was blocked rather than the page missing
const BLOCKED_STATUSES: [u16; 3] = [401, 403, 429];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Result ends the race
    Accept { reason: String },
    /// Result is discarded and the next engine gets a chance
    Reject { reason: String },
    /// Restart the scrape with these flags added
    AddFeature(FeatureSet),
}

pub struct SuccessEvaluator {
    converter: Arc<dyn MarkdownConverter>,
}

impl SuccessEvaluator {
    pub fn new(converter: Arc<dyn MarkdownConverter>) -> Self {
        Self { converter }
    }

    pub async fn evaluate(&self, ctx: &EngineContext, result: &EngineResult) -> Verdict {
        if BLOCKED_STATUSES.contains(&result.status_code)
            && ctx.options.proxy == ProxyMode::Auto
            && !ctx.features.contains(FeatureFlag::StealthProxy)
        {
            return Verdict::AddFeature(FeatureSet::from([FeatureFlag::StealthProxy]));
        }

        let text_len = self.text_length(ctx, result).await;
        let good_status = is_good_status(result.status_code);

        if text_len > 0 {
            Verdict::Accept {
                reason: format!("{text_len} characters of text"),
            }
        } else if !good_status {
            // An empty error page is still the site's answer
            Verdict::Accept {
                reason: format!("status {} with no text", result.status_code),
            }
        } else {
            Verdict::Reject {
                reason: format!("status {} but no text content", result.status_code),
            }
        }
    }

    /// Length of the trimmed markdown, widening the extraction when the
    /// main-content view comes up empty.
    async fn text_length(&self, ctx: &EngineContext, result: &EngineResult) -> usize {
        let url = Url::parse(&result.url).unwrap_or_else(|_| ctx.url.clone());
        let extraction = ExtractionOptions::from_options(&ctx.options);

        if !result.html.is_empty() {
            let main = self
                .converter
                .to_markdown(&result.html, &url, &extraction.clone().main_content(true))
                .await;
            let len = main.trim().len();
            if len > 0 {
                return len;
            }

            let full = self
                .converter
                .to_markdown(&result.html, &url, &extraction.main_content(false))
                .await;
            let len = full.trim().len();
            if len > 0 {
                return len;
            }
        }

        result
            .markdown
            .as_deref()
            .map(|markdown| markdown.trim().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::{AbortManager, AbortTier};
    use crate::options::{InternalOptions, ScrapeOptions};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Strips tags; pretends `<nav>` is the only non-main content.
    struct TagStripper;

    #[async_trait]
    impl MarkdownConverter for TagStripper {
        async fn to_markdown(&self, html: &str, _url: &Url, options: &ExtractionOptions) -> String {
            let html = if options.only_main_content {
                match (html.find("<nav>"), html.find("</nav>")) {
                    (Some(start), Some(end)) => format!("{}{}", &html[..start], &html[end + 6..]),
                    _ => html.to_string(),
                }
            } else {
                html.to_string()
            };

            let mut text = String::new();
            let mut in_tag = false;
            for c in html.chars() {
                match c {
                    '<' => in_tag = true,
                    '>' => in_tag = false,
                    _ if !in_tag => text.push(c),
                    _ => {}
                }
            }
            text
        }
    }

    fn ctx(proxy: ProxyMode, features: FeatureSet) -> EngineContext {
        let options = ScrapeOptions::builder().proxy(proxy).build();
        let abort = AbortManager::new(None, Duration::from_secs(60));
        EngineContext {
            scrape_id: "s-1".to_string(),
            url: Url::parse("https://example.com").unwrap(),
            options: Arc::new(options),
            internal: Arc::new(InternalOptions::default()),
            features,
            pdf_prefetch: None,
            abort: abort.child(AbortTier::Engine, None),
        }
    }

    fn evaluator() -> SuccessEvaluator {
        SuccessEvaluator::new(Arc::new(TagStripper))
    }

    #[tokio::test]
    async fn test_ok_page_with_text_is_accepted() {
        let result = EngineResult::new("https://example.com", 200, "<p>hello</p>");
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }

    #[tokio::test]
    async fn test_ok_page_without_text_is_rejected() {
        let result = EngineResult::new("https://example.com", 200, "<div>  </div>");
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Reject { .. }));
    }

    #[tokio::test]
    async fn test_empty_not_found_is_accepted() {
        let result = EngineResult::new("https://example.com", 404, "");
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }

    #[tokio::test]
    async fn test_blocked_status_under_auto_proxy_requests_stealth() {
        let result = EngineResult::new("https://example.com", 403, "<p>denied</p>");
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert_eq!(
            verdict,
            Verdict::AddFeature(FeatureSet::from([FeatureFlag::StealthProxy]))
        );
    }

    #[tokio::test]
    async fn test_blocked_status_with_stealth_already_on_is_accepted() {
        let result = EngineResult::new("https://example.com", 429, "<p>slow down</p>");
        let verdict = evaluator()
            .evaluate(
                &ctx(
                    ProxyMode::Auto,
                    FeatureSet::from([FeatureFlag::StealthProxy]),
                ),
                &result,
            )
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));

        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Basic, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }

    #[tokio::test]
    async fn test_falls_back_to_full_page_text() {
        let result = EngineResult::new("https://example.com", 200, "<nav>menu</nav>");
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }

    #[tokio::test]
    async fn test_engine_markdown_counts_when_there_is_no_html() {
        let mut result = EngineResult::new("https://example.com/doc.pdf", 200, "");
        result.markdown = Some("# Report".to_string());
        let verdict = evaluator()
            .evaluate(&ctx(ProxyMode::Auto, FeatureSet::new()), &result)
            .await;
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }
}
