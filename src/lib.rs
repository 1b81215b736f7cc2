pub mod abort;
pub mod config;
pub mod convert;
pub mod document;
pub mod engines;
pub mod features;
pub mod humanize;
pub mod observability;
pub mod options;
pub mod scrape;

pub use config::Config;
pub use document::Document;
pub use options::{InternalOptions, ScrapeOptions};
pub use scrape::{ScrapeError, Scraper, new_scrape_id};
