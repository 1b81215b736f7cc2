//! HTML conversion seam.
//!
//! The conversion algorithm itself lives outside this crate; the orchestrator
//! only needs to ask for markdown (to judge results and build documents) and
//! optionally for cleaned HTML.

use async_trait::async_trait;
use url::Url;

use crate::options::ScrapeOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOptions {
    pub only_main_content: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
}

impl ExtractionOptions {
    pub fn from_options(options: &ScrapeOptions) -> Self {
        Self {
            only_main_content: options.only_main_content,
            include_tags: options.include_tags.clone(),
            exclude_tags: options.exclude_tags.clone(),
        }
    }

    pub fn main_content(mut self, only_main_content: bool) -> Self {
        self.only_main_content = only_main_content;
        self
    }
}

#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    /// Convert HTML to markdown. Failures should come back as an empty string.
    async fn to_markdown(&self, html: &str, url: &Url, options: &ExtractionOptions) -> String;

    /// HTML for the `html` output format
    async fn clean_html(&self, html: &str, _url: &Url, _options: &ExtractionOptions) -> String {
        html.to_string()
    }
}
