use crate::scrapers::olx::BlockSignal;
use anyhow::Result;
use async_trait::async_trait;

/// One browser tab driven by the crawler.
///
/// Everything the crawler knows about the remote site passes through
/// this trait, so tests can replay stored markup instead of a live browser.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Load a URL and wait for the page to settle
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Fully rendered source of the current page
    async fn current_markup(&self) -> Result<String>;

    /// Check the current page for anti-bot signals
    async fn detect_block(&self) -> Result<Option<BlockSignal>>;

    /// Store diagnostics for a blocked page
    async fn capture(&self, reason: &str) -> Result<()>;

    /// Release the underlying browser. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Client identity the session presents
    fn user_agent(&self) -> &str;
}

/// Opens fresh sessions, one per crawled search link
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: PageSession;

    async fn open(&self) -> Result<Self::Session>;
}
