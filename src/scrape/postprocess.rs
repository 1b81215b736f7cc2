//! Postprocessors that rewrite the winning engine result.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::engines::{EngineError, EngineResult};

use super::meta::ScrapeMeta;

#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("postprocessor failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[async_trait]
pub trait Postprocessor: Send + Sync {
    fn name(&self) -> &str;

    /// `already_used` holds the names of postprocessors that ran before this
    /// one for the same result.
    fn should_run(&self, meta: &ScrapeMeta, url: &Url, already_used: &[String]) -> bool;

    async fn run(
        &self,
        meta: &ScrapeMeta,
        result: &EngineResult,
    ) -> Result<EngineResult, PostprocessError>;
}

/// Run postprocessors in registration order. A failing postprocessor is
/// logged and skipped; the result it was given carries on unchanged.
pub async fn run_postprocessors(
    postprocessors: &[Arc<dyn Postprocessor>],
    meta: &ScrapeMeta,
    mut result: EngineResult,
) -> EngineResult {
    let mut already_used: Vec<String> = Vec::new();

    for postprocessor in postprocessors {
        let url = Url::parse(&result.url).unwrap_or_else(|_| meta.url.clone());
        if !postprocessor.should_run(meta, &url, &already_used) {
            continue;
        }

        debug!(postprocessor = postprocessor.name(), "Running postprocessor");
        match postprocessor.run(meta, &result).await {
            Ok(updated) => {
                result = updated;
                already_used.push(postprocessor.name().to_string());
            }
            Err(e) => {
                warn!(
                    postprocessor = postprocessor.name(),
                    error = %e,
                    "Postprocessor failed, keeping previous result"
                );
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{InternalOptions, ScrapeOptions};
    use std::time::Duration;

    struct Append(&'static str);

    #[async_trait]
    impl Postprocessor for Append {
        fn name(&self) -> &str {
            self.0
        }

        fn should_run(&self, _meta: &ScrapeMeta, _url: &Url, already_used: &[String]) -> bool {
            !already_used.iter().any(|name| name == self.0)
        }

        async fn run(
            &self,
            _meta: &ScrapeMeta,
            result: &EngineResult,
        ) -> Result<EngineResult, PostprocessError> {
            let mut result = result.clone();
            result.html.push_str(self.0);
            Ok(result)
        }
    }

    struct Broken;

    #[async_trait]
    impl Postprocessor for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn should_run(&self, _meta: &ScrapeMeta, _url: &Url, _already_used: &[String]) -> bool {
            true
        }

        async fn run(
            &self,
            _meta: &ScrapeMeta,
            _result: &EngineResult,
        ) -> Result<EngineResult, PostprocessError> {
            Err(PostprocessError::Failed("upstream unavailable".to_string()))
        }
    }

    /// Only runs for hosts it knows about.
    struct HostOnly;

    #[async_trait]
    impl Postprocessor for HostOnly {
        fn name(&self) -> &str {
            "host-only"
        }

        fn should_run(&self, _meta: &ScrapeMeta, url: &Url, _already_used: &[String]) -> bool {
            url.host_str() == Some("video.example.com")
        }

        async fn run(
            &self,
            _meta: &ScrapeMeta,
            _result: &EngineResult,
        ) -> Result<EngineResult, PostprocessError> {
            Err(PostprocessError::Failed("should not run".to_string()))
        }
    }

    fn meta() -> ScrapeMeta {
        ScrapeMeta::new(
            "s-1",
            Url::parse("https://example.com").unwrap(),
            Arc::new(ScrapeOptions::default()),
            Arc::new(InternalOptions::default()),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_runs_in_order_and_swallows_errors() {
        let postprocessors: Vec<Arc<dyn Postprocessor>> = vec![
            Arc::new(Append("a")),
            Arc::new(Broken),
            Arc::new(HostOnly),
            Arc::new(Append("b")),
            Arc::new(Append("a")),
        ];

        let result = run_postprocessors(
            &postprocessors,
            &meta(),
            EngineResult::new("https://example.com/", 200, "<p>"),
        )
        .await;

        assert_eq!(result.html, "<p>ab");
    }
}
