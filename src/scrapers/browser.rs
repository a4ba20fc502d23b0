use crate::config::CrawlerConfig;
use crate::scrapers::olx::{BlockSignal, OlxSchema};
use crate::scrapers::traits::{PageSession, SessionLauncher};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// File name for a block-page screenshot taken at `at`
pub fn capture_file_name(at: DateTime<Utc>) -> String {
    format!("captcha-{}.png", at.timestamp())
}

fn pick_user_agent(pool: &[String]) -> Result<String> {
    pool.choose(&mut rand::thread_rng())
        .cloned()
        .context("No user agents configured")
}

/// Launches headless Chrome sessions with a rotated user agent
pub struct ChromeLauncher {
    user_agents: Vec<String>,
    settle_delay: Duration,
    captures_dir: PathBuf,
    schema: Arc<OlxSchema>,
}

impl ChromeLauncher {
    pub fn new(config: &CrawlerConfig, schema: Arc<OlxSchema>) -> Self {
        Self {
            user_agents: config.user_agents.clone(),
            settle_delay: config.settle_delay(),
            captures_dir: PathBuf::from(&config.captures_dir),
            schema,
        }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn open(&self) -> Result<ChromeSession> {
        let user_agent = pick_user_agent(&self.user_agents)?;
        info!("Launching headless Chrome...");
        debug!("User agent: {}", user_agent);

        let ua = user_agent.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let ua_arg = format!("--user-agent={ua}");
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .args(vec![
                    OsStr::new("--disable-setuid-sandbox"),
                    OsStr::new(&ua_arg),
                ])
                .build()
                .context("Failed to build launch options")?;

            let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
            let tab = browser.new_tab().context("Failed to open browser tab")?;
            Ok((browser, tab))
        })
        .await
        .context("Browser launch task panicked")??;

        Ok(ChromeSession {
            browser: Some(browser),
            tab: Some(tab),
            user_agent,
            settle_delay: self.settle_delay,
            captures_dir: self.captures_dir.clone(),
            schema: Arc::clone(&self.schema),
        })
    }
}

/// A single headless Chrome tab.
///
/// The browser process goes away on [`PageSession::close`] or, failing
/// that, when the session is dropped.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    user_agent: String,
    settle_delay: Duration,
    captures_dir: PathBuf,
    schema: Arc<OlxSchema>,
}

impl ChromeSession {
    /// Run a blocking driver call off the async executor
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = self
            .tab
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| anyhow!("Browser session already closed"))?;
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .context("Browser task panicked")?
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let target = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .with_context(|| format!("Failed to load {url}"))?;

        // let client-side rendering finish before the source is read
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    async fn current_markup(&self) -> Result<String> {
        self.with_tab(|tab| tab.get_content()).await
    }

    async fn detect_block(&self) -> Result<Option<BlockSignal>> {
        let markup = self.current_markup().await?;
        Ok(self.schema.block_signal(&markup))
    }

    async fn capture(&self, reason: &str) -> Result<()> {
        let png = self
            .with_tab(|tab| {
                tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            })
            .await?;

        tokio::fs::create_dir_all(&self.captures_dir).await?;
        let path = self.captures_dir.join(capture_file_name(Utc::now()));
        tokio::fs::write(&path, png).await?;
        warn!("Saved {} screenshot to {}", reason, path.display());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let tab = self.tab.take();
        let browser = self.browser.take();
        if tab.is_none() && browser.is_none() {
            return Ok(());
        }

        debug!("Closing browser session");
        tokio::task::spawn_blocking(move || {
            if let Some(tab) = tab {
                if let Err(e) = tab.close(false) {
                    debug!("Failed to close browser tab: {:#}", e);
                }
            }
            drop(browser);
        })
        .await
        .context("Browser shutdown task panicked")?;
        Ok(())
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
