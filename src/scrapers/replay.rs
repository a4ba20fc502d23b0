//! Page sessions that serve stored markup instead of driving a browser.
//!
//! Every navigation and capture is recorded in a shared [`ReplayLog`]
//! so callers can check what the crawler asked for.

use crate::scrapers::olx::{BlockSignal, OlxSchema};
use crate::scrapers::traits::{PageSession, SessionLauncher};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the replayed sessions were asked to do
#[derive(Debug, Clone, Default)]
pub struct ReplayLog {
    pub navigations: Vec<String>,
    pub captures: Vec<String>,
    pub opened: usize,
    pub closed: usize,
}

/// Hands out [`ReplaySession`]s over a fixed URL -> markup table
#[derive(Clone)]
pub struct ReplayLauncher {
    pages: Arc<HashMap<String, String>>,
    log: Arc<Mutex<ReplayLog>>,
    schema: Arc<OlxSchema>,
}

impl ReplayLauncher {
    pub fn new(schema: Arc<OlxSchema>) -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            log: Arc::new(Mutex::new(ReplayLog::default())),
            schema,
        }
    }

    /// Serve `markup` whenever `url` is loaded
    pub fn page(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), markup.into());
        self
    }

    /// Snapshot of everything recorded so far
    pub fn log(&self) -> ReplayLog {
        lock(&self.log).clone()
    }
}

fn lock(log: &Mutex<ReplayLog>) -> MutexGuard<'_, ReplayLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl SessionLauncher for ReplayLauncher {
    type Session = ReplaySession;

    async fn open(&self) -> Result<ReplaySession> {
        lock(&self.log).opened += 1;
        Ok(ReplaySession {
            pages: Arc::clone(&self.pages),
            log: Arc::clone(&self.log),
            schema: Arc::clone(&self.schema),
            current: None,
            closed: false,
        })
    }
}

pub struct ReplaySession {
    pages: Arc<HashMap<String, String>>,
    log: Arc<Mutex<ReplayLog>>,
    schema: Arc<OlxSchema>,
    current: Option<String>,
    closed: bool,
}

#[async_trait]
impl PageSession for ReplaySession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        if self.closed {
            bail!("Replay session already closed");
        }
        lock(&self.log).navigations.push(url.to_string());
        if !self.pages.contains_key(url) {
            bail!("No stored page for {url}");
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn current_markup(&self) -> Result<String> {
        let url = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("Nothing loaded yet"))?;
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }

    async fn detect_block(&self) -> Result<Option<BlockSignal>> {
        let markup = self.current_markup().await?;
        Ok(self.schema.block_signal(&markup))
    }

    async fn capture(&self, reason: &str) -> Result<()> {
        lock(&self.log).captures.push(reason.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            lock(&self.log).closed += 1;
        }
        Ok(())
    }

    fn user_agent(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> ReplayLauncher {
        ReplayLauncher::new(Arc::new(OlxSchema::new().unwrap()))
            .page("https://example.test/ok", "<html><body>ok</body></html>")
            .page(
                "https://example.test/wall",
                r#"<html><body><div class="g-recaptcha"></div></body></html>"#,
            )
    }

    #[tokio::test]
    async fn test_replays_stored_markup() {
        let launcher = launcher();
        let mut session = launcher.open().await.unwrap();
        session.navigate("https://example.test/ok").await.unwrap();
        assert!(session.current_markup().await.unwrap().contains("ok"));
        assert_eq!(session.detect_block().await.unwrap(), None);

        session.navigate("https://example.test/wall").await.unwrap();
        assert_eq!(
            session.detect_block().await.unwrap(),
            Some(BlockSignal::ChallengeWidget)
        );
    }

    #[tokio::test]
    async fn test_unknown_url_is_a_session_failure() {
        let launcher = launcher();
        let mut session = launcher.open().await.unwrap();
        assert!(session.navigate("https://example.test/missing").await.is_err());
        assert_eq!(launcher.log().navigations.len(), 1);
    }

    #[tokio::test]
    async fn test_close_counts_once() {
        let launcher = launcher();
        let mut session = launcher.open().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        let log = launcher.log();
        assert_eq!((log.opened, log.closed), (1, 1));
        assert!(session.navigate("https://example.test/ok").await.is_err());
    }
}
