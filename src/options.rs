//! Request models for a single scrape.
//!
//! [`ScrapeOptions`] is the caller-facing, immutable description of what to
//! fetch and how. [`InternalOptions`] carries flags that only the embedding
//! system sets (crawl membership, forced engines, caller cancellation).
//!
//! ```rust
//! use scrapebox::options::{Format, ProxyMode, ScrapeOptions};
//!
//! let options = ScrapeOptions::builder()
//!     .formats(vec![Format::Markdown, Format::Screenshot])
//!     .proxy(ProxyMode::Auto)
//!     .wait_for(500)
//!     .build();
//! assert!(options.wants(Format::Screenshot));
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub type HeadersMap = BTreeMap<String, String>;

/// Output formats a caller can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Links,
    Screenshot,
    #[serde(rename = "screenshot@fullPage")]
    ScreenshotFullPage,
}

/// Proxy strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Basic,
    Stealth,
    /// Start with a basic proxy and escalate to stealth on 401/403/429
    #[default]
    Auto,
}

/// Browser action executed before content is captured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Wait {
        milliseconds: Option<u64>,
        selector: Option<String>,
    },
    Click {
        selector: String,
    },
    Screenshot {
        #[serde(default)]
        full_page: bool,
    },
    WriteText {
        text: String,
    },
    Press {
        key: String,
    },
    Scroll {
        direction: String,
    },
    Scrape,
    ExecuteJavascript {
        script: String,
    },
}

impl Action {
    /// Explicit wait time this action adds to a page load, if any
    pub fn wait_millis(&self) -> u64 {
        match self {
            Action::Wait {
                milliseconds: Some(ms),
                ..
            } => *ms,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    #[serde(default)]
    pub languages: Vec<String>,
}

fn default_formats() -> Vec<Format> {
    vec![Format::Markdown]
}

fn default_true() -> bool {
    true
}

/// Caller-facing scrape options; never mutated once a scrape starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    #[serde(default = "default_formats")]
    #[builder(default = default_formats())]
    pub formats: Vec<Format>,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub only_main_content: bool,
    #[serde(default)]
    #[builder(default)]
    pub include_tags: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub exclude_tags: Vec<String>,
    /// Milliseconds to wait after load before capturing
    #[serde(default)]
    #[builder(default)]
    pub wait_for: u64,
    /// Whole-scrape timeout in milliseconds; the configured default applies when unset
    pub timeout: Option<u64>,
    #[serde(default)]
    #[builder(default)]
    pub proxy: ProxyMode,
    #[serde(default)]
    #[builder(default)]
    pub actions: Vec<Action>,
    pub location: Option<Location>,
    #[serde(default)]
    #[builder(default)]
    pub mobile: bool,
    #[serde(default)]
    #[builder(default)]
    pub skip_tls_verification: bool,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub block_ads: bool,
    #[serde(default)]
    #[builder(default)]
    pub fast_mode: bool,
    #[serde(default)]
    #[builder(default)]
    pub headers: HeadersMap,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScrapeOptions {
    pub fn wants(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    pub fn wants_screenshot(&self) -> bool {
        self.wants(Format::Screenshot) || self.wants(Format::ScreenshotFullPage)
    }
}

/// Options set by the embedding system rather than the end user
#[derive(Debug, Clone, Default, Builder)]
pub struct InternalOptions {
    /// Present when the scrape belongs to a multi-page crawl
    #[builder(into)]
    pub crawl_id: Option<String>,
    /// Engines to use verbatim, in order, bypassing capability scoring
    pub force_engine: Option<Vec<String>>,
    #[builder(default)]
    pub atsv: bool,
    /// Caller-supplied cancellation for the whole scrape
    pub abort: Option<CancellationToken>,
}

impl InternalOptions {
    pub fn is_crawl(&self) -> bool {
        self.crawl_id.is_some()
    }
}
