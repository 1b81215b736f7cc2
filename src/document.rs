//! Final scrape output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyUsed {
    Basic,
    Stealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// URL as requested
    pub source_url: String,
    /// URL after redirects
    pub url: String,
    pub scrape_id: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub proxy_used: ProxyUsed,
    /// Engine whose result won the race
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<u32>,
    /// Set when the page answered with a status outside 2xx/304
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Document {
    pub fn status_code(&self) -> u16 {
        self.metadata.status_code
    }

    pub fn has_good_status(&self) -> bool {
        is_good_status(self.metadata.status_code)
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// 2xx and 304 are the statuses a scrape is satisfied with
pub fn is_good_status(status_code: u16) -> bool {
    (200..300).contains(&status_code) || status_code == 304
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_good_status_range() {
        assert!(is_good_status(200));
        assert!(is_good_status(299));
        assert!(is_good_status(304));
        assert!(!is_good_status(301));
        assert!(!is_good_status(404));
        assert!(!is_good_status(500));
        assert!(!is_good_status(0));
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let document = Document {
            markdown: Some("# Hi".to_string()),
            html: None,
            raw_html: None,
            links: None,
            screenshot: None,
            metadata: DocumentMetadata {
                source_url: "https://example.com".to_string(),
                url: "https://example.com/".to_string(),
                scrape_id: "s-1".to_string(),
                status_code: 200,
                content_type: None,
                proxy_used: ProxyUsed::Basic,
                engine: "fetch".to_string(),
                num_pages: None,
                error: None,
                scraped_at: Utc::now(),
            },
            warnings: vec![],
        };

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["markdown"], "# Hi");
        assert!(value.get("rawHtml").is_none());
        assert!(value.get("warnings").is_none());
        assert_eq!(value["metadata"]["proxyUsed"], "basic");
        assert_eq!(value["metadata"]["statusCode"], 200);
    }
}
