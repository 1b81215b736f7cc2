//! Document assembly and document-level transformers.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::convert::{ExtractionOptions, MarkdownConverter};
use crate::document::{Document, DocumentMetadata, is_good_status};
use crate::engines::EngineResult;
use crate::features::FeatureSet;
use crate::options::Format;

use super::error::ScrapeError;
use super::meta::ScrapeMeta;

#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, meta: &ScrapeMeta, document: Document)
    -> Result<Document, ScrapeError>;
}

/// Drops output fields for formats the caller did not ask for
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatCoercion;

#[async_trait]
impl Transformer for FormatCoercion {
    fn name(&self) -> &str {
        "format-coercion"
    }

    async fn transform(
        &self,
        meta: &ScrapeMeta,
        mut document: Document,
    ) -> Result<Document, ScrapeError> {
        let options = &meta.options;

        if !options.wants(Format::Markdown) {
            document.markdown = None;
        }
        if !options.wants(Format::Html) {
            document.html = None;
        }
        if !options.wants(Format::RawHtml) {
            document.raw_html = None;
        }
        if !options.wants(Format::Links) {
            document.links = None;
        }

        if !options.wants_screenshot() {
            document.screenshot = None;
        } else if document.screenshot.is_none() {
            document.push_warning(
                "A screenshot was requested but the engine used did not return one.",
            );
        }

        Ok(document)
    }
}

/// Assemble the document from the winning result.
///
/// Every field the result can fill is filled; [`FormatCoercion`] trims the
/// ones that were not requested.
pub async fn build_document(
    converter: &dyn MarkdownConverter,
    meta: &ScrapeMeta,
    engine: &str,
    unsupported_features: &FeatureSet,
    result: EngineResult,
) -> Document {
    let url = Url::parse(&result.url).unwrap_or_else(|_| meta.url.clone());
    let extraction = ExtractionOptions::from_options(&meta.options);

    let markdown = match result.markdown {
        Some(markdown) => Some(markdown),
        None if meta.options.wants(Format::Markdown) => {
            Some(converter.to_markdown(&result.html, &url, &extraction).await)
        }
        None => None,
    };
    let html = if meta.options.wants(Format::Html) {
        Some(converter.clean_html(&result.html, &url, &extraction).await)
    } else {
        None
    };

    let error = result.error.or_else(|| {
        (!is_good_status(result.status_code))
            .then(|| format!("request failed with status code {}", result.status_code))
    });

    let mut document = Document {
        markdown,
        html,
        raw_html: Some(result.html),
        links: result.links,
        screenshot: result.screenshot,
        metadata: DocumentMetadata {
            source_url: meta.url.to_string(),
            url: url.to_string(),
            scrape_id: meta.id.clone(),
            status_code: result.status_code,
            content_type: result.content_type,
            proxy_used: meta.proxy_used(),
            engine: engine.to_string(),
            num_pages: result.num_pages,
            error,
            scraped_at: Utc::now(),
        },
        warnings: Vec::new(),
    };

    if !unsupported_features.is_empty() {
        document.push_warning(format!(
            "The engine used does not support the following features: {unsupported_features} -- your scrape may be partial."
        ));
    }

    document
}

/// Run transformers in order; the first failure ends the pipeline.
pub async fn run_transformers(
    transformers: &[Arc<dyn Transformer>],
    meta: &ScrapeMeta,
    mut document: Document,
) -> Result<Document, ScrapeError> {
    for transformer in transformers {
        debug!(transformer = transformer.name(), "Running transformer");
        document = transformer
            .transform(meta, document)
            .await
            .inspect_err(|e| {
                warn!(transformer = transformer.name(), error = %e, "Transformer failed");
            })?;
    }
    Ok(document)
}
