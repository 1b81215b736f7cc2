use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::abort::AbortManager;
use crate::features::FeatureSet;
use crate::options::{InternalOptions, ScrapeOptions};

/// Per-attempt view of the request handed to an engine
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub scrape_id: String,
    pub url: Url,
    pub options: Arc<ScrapeOptions>,
    pub internal: Arc<InternalOptions>,
    /// Snapshot of the feature set at launch; never changes during the attempt
    pub features: FeatureSet,
    pub pdf_prefetch: Option<Arc<PdfPrefetch>>,
    /// Engine-tier abort handle for this attempt
    pub abort: AbortManager,
}

/// A document downloaded through an alternate rendering path
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPrefetch {
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// Raw engine output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResult {
    /// Final URL after redirects
    pub url: String,
    pub html: String,
    /// Markdown produced by the engine itself (documents, PDFs)
    pub markdown: Option<String>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub screenshot: Option<String>,
    pub links: Option<Vec<String>>,
    pub num_pages: Option<u32>,
    /// Page-level error reported by the engine
    pub error: Option<String>,
}

impl EngineResult {
    pub fn new(url: impl Into<String>, status_code: u16, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            status_code,
            ..Default::default()
        }
    }
}

/// Raw failure reported by an engine
///
/// Engines report what happened; whether that is fatal, a reason to adjust
/// features or a reason to move on is decided by the orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine failed: {0}")]
    Failed(String),

    #[error("no indexed copy of the page is available")]
    IndexMiss,

    #[error("engine '{engine}' returned no usable content: {reason}")]
    Unsuccessful { engine: String, reason: String },

    #[error(transparent)]
    Aborted(#[from] crate::abort::AbortError),

    #[error("engine requested additional features: {flags}")]
    AddFeature {
        flags: FeatureSet,
        pdf_prefetch: Option<PdfPrefetch>,
    },

    #[error("engine requested removal of features: {flags}")]
    RemoveFeature { flags: FeatureSet },

    #[error("site could not be reached: {0}")]
    Site(String),

    #[error("TLS handshake failed")]
    Ssl { skip_tls_verification: bool },

    #[error("DNS resolution failed for hostname: {0}")]
    DnsResolution(String),

    #[error("action {index} failed: {message}")]
    Action { index: usize, message: String },

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("LLM refused the request: {0}")]
    LlmRefusal(String),

    #[error("proxy selection failed: {0}")]
    ProxySelection(String),

    #[error("PDF download blocked by anti-bot protection")]
    PdfAntibot,

    #[error("document download blocked by anti-bot protection")]
    DocumentAntibot,

    #[error("PDF with {pages} pages needs at least {minimum_timeout_ms}ms")]
    PdfInsufficientTime { pages: u32, minimum_timeout_ms: u64 },
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        EngineError::Failed(message.into())
    }

    pub fn add_feature(flags: impl Into<FeatureSet>) -> Self {
        EngineError::AddFeature {
            flags: flags.into(),
            pdf_prefetch: None,
        }
    }

    pub fn remove_feature(flags: impl Into<FeatureSet>) -> Self {
        EngineError::RemoveFeature {
            flags: flags.into(),
        }
    }
}
