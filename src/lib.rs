//! OLX Scout: watches classifieds searches on OLX
//!
//! Result pages of saved searches are walked with a headless browser,
//! new listings are fetched in detail, filtered by keywords and stored
//! with their price history. Stored listings can then be ranked as deals.

pub mod config;
pub mod crawler;
pub mod deals;
pub mod models;
pub mod scrapers;
pub mod storage;

use thiserror::Error;

/// Errors that end the crawl of a search link
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The browser layer failed (launch, navigation, page source)
    #[error("browser session failed: {0:#}")]
    Session(#[from] anyhow::Error),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },

    #[error("URL {url} does not belong to {expected}")]
    ForeignUrl { url: String, expected: String },

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

pub use config::Config;
pub use crawler::{CrawlReport, CrawlStatus, Crawler, RateLimiter};
pub use models::{ListingRecord, SearchLink};
pub use storage::{ListingStore, SqliteStore};
