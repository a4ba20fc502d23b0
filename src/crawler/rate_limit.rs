//! Sliding-window limit on outbound page loads
//!
//! One limiter is shared by every session of a run; list pages and detail
//! pages draw from the same budget.

use crate::config::CrawlerConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::info;

/// At most `max_requests` admissions in any trailing `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    margin: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, margin: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            margin,
            stamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_requests, config.window(), config.margin())
    }

    /// Wait until one more request fits in the window, then record it.
    ///
    /// The window lock is held while waiting, so concurrent callers are
    /// admitted one at a time in arrival order.
    pub async fn admit(&self) {
        let mut stamps = self.stamps.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = stamps.front() {
                if now.duration_since(oldest) >= self.window {
                    stamps.pop_front();
                } else {
                    break;
                }
            }

            if stamps.len() < self.max_requests {
                stamps.push_back(now);
                return;
            }

            // the window is full, so there is a front entry
            let oldest = stamps[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest)) + self.margin;
            info!(
                "Request limit reached ({}/{}s), waiting {}s",
                self.max_requests,
                self.window.as_secs(),
                wait.as_secs()
            );
            sleep(wait).await;
        }
    }

    /// Requests admitted within the trailing window
    pub async fn in_window(&self) -> usize {
        let stamps = self.stamps.lock().await;
        let now = Instant::now();
        stamps
            .iter()
            .filter(|&&ts| now.duration_since(ts) < self.window)
            .count()
    }
}
