//! Crawl pipeline: rate limiting, keyword filtering and the per-link
//! orchestration of page sessions.

pub mod keywords;
pub mod orchestrator;
pub mod rate_limit;

pub use keywords::{keywords_from_url, matches_keywords, resolve_keywords};
pub use orchestrator::{page_url, CrawlPhase, CrawlReport, CrawlStatus, Crawler, LinkRun, Progress};
pub use rate_limit::RateLimiter;
