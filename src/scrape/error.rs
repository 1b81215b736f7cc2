use thiserror::Error;

use crate::abort::AbortTier;
use crate::engines::{EngineError, EngineResult, PdfPrefetch};
use crate::features::FeatureSet;

use super::meta::ScrapeMeta;

/// One failed engine attempt, kept for the "no engines left" report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    pub engine: String,
    pub error: String,
}

/// Terminal failure of a scrape, as seen by the caller
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{}", no_engines_message(.failures))]
    NoEnginesLeft { failures: Vec<EngineFailure> },

    #[error("{}", timeout_message(.timeout_ms, .caller_specified))]
    Timeout { timeout_ms: u64, caller_specified: bool },

    #[error("scrape was cancelled by the caller")]
    Cancelled,

    #[error("site could not be reached: {0}")]
    Site(String),

    #[error("{}", ssl_message(.skip_tls_verification))]
    Ssl { skip_tls_verification: bool },

    #[error("DNS resolution failed for hostname: {0}")]
    Dns(String),

    #[error("action {index} failed: {message}")]
    Action { index: usize, message: String },

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("LLM refused to process the page: {0}")]
    LlmRefusal(String),

    #[error("no proxy could be selected: {0}")]
    ProxySelection(String),

    #[error("PDF download was blocked by anti-bot protection")]
    PdfAntibot,

    #[error("document download was blocked by anti-bot protection")]
    DocumentAntibot,

    #[error(
        "PDF has {pages} pages and needs a timeout of at least {minimum_timeout_ms}ms"
    )]
    PdfInsufficientTime { pages: u32, minimum_timeout_ms: u64 },

    #[error("engines are forced for this scrape; cannot adjust features ({flags})")]
    ForcedEngineFeatureMismatch { flags: FeatureSet },

    #[error("engines repeated a feature adjustment that changes nothing ({flags})")]
    FeatureAdjustmentStalled { flags: FeatureSet },

    #[error("transformer '{name}' failed: {message}")]
    Transformer { name: String, message: String },
}

fn no_engines_message(failures: &[EngineFailure]) -> String {
    if failures.is_empty() {
        return "all scraping engines failed: no engine can handle this request".to_string();
    }
    let tried: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.engine, f.error))
        .collect();
    format!(
        "all scraping engines failed: {}; double check the URL to make sure it is not broken",
        tried.join(", ")
    )
}

fn timeout_message(timeout_ms: &u64, caller_specified: &bool) -> String {
    if *caller_specified {
        format!("scrape timed out after waiting the requested {timeout_ms}ms")
    } else {
        format!("scrape timed out after the default maximum of {timeout_ms}ms")
    }
}

fn ssl_message(skip_tls_verification: &bool) -> String {
    if *skip_tls_verification {
        "TLS error while scraping the URL, even with TLS verification disabled".to_string()
    } else {
        "TLS error while scraping the URL; if no sensitive data is involved, retry with skip_tls_verification enabled"
            .to_string()
    }
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Timeout { .. })
    }
}

/// Closed classification of one finished engine attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(EngineResult),
    Fatal(ScrapeError),
    FeatureAdd {
        flags: FeatureSet,
        pdf_prefetch: Option<PdfPrefetch>,
    },
    FeatureRemove {
        flags: FeatureSet,
    },
    EngineExhausted(EngineError),
}

impl AttemptOutcome {
    pub fn classify(outcome: Result<EngineResult, EngineError>, meta: &ScrapeMeta) -> Self {
        let error = match outcome {
            Ok(result) => return AttemptOutcome::Success(result),
            Err(error) => error,
        };

        match error {
            EngineError::Failed(_) | EngineError::IndexMiss | EngineError::Unsuccessful { .. } => {
                AttemptOutcome::EngineExhausted(error)
            }
            EngineError::Aborted(abort) => match abort.tier {
                AbortTier::Engine => AttemptOutcome::EngineExhausted(EngineError::Aborted(abort)),
                AbortTier::Scrape | AbortTier::External => {
                    AttemptOutcome::Fatal(meta.abort_error(abort))
                }
            },
            EngineError::AddFeature {
                flags,
                pdf_prefetch,
            } => AttemptOutcome::FeatureAdd {
                flags,
                pdf_prefetch,
            },
            EngineError::RemoveFeature { flags } => AttemptOutcome::FeatureRemove { flags },
            EngineError::Site(message) => AttemptOutcome::Fatal(ScrapeError::Site(message)),
            EngineError::Ssl {
                skip_tls_verification,
            } => AttemptOutcome::Fatal(ScrapeError::Ssl {
                skip_tls_verification,
            }),
            EngineError::DnsResolution(host) => AttemptOutcome::Fatal(ScrapeError::Dns(host)),
            EngineError::Action { index, message } => {
                AttemptOutcome::Fatal(ScrapeError::Action { index, message })
            }
            EngineError::UnsupportedFile(kind) => {
                AttemptOutcome::Fatal(ScrapeError::UnsupportedFile(kind))
            }
            EngineError::LlmRefusal(message) => {
                AttemptOutcome::Fatal(ScrapeError::LlmRefusal(message))
            }
            EngineError::ProxySelection(message) => {
                AttemptOutcome::Fatal(ScrapeError::ProxySelection(message))
            }
            EngineError::PdfAntibot => AttemptOutcome::Fatal(ScrapeError::PdfAntibot),
            EngineError::DocumentAntibot => AttemptOutcome::Fatal(ScrapeError::DocumentAntibot),
            EngineError::PdfInsufficientTime {
                pages,
                minimum_timeout_ms,
            } => AttemptOutcome::Fatal(ScrapeError::PdfInsufficientTime {
                pages,
                minimum_timeout_ms,
            }),
        }
    }
}
