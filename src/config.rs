//! Configuration loading
//!
//! Every key is optional; a missing file at the default location simply
//! yields [`Config::default`].

use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Client identities rotated between browser sessions
pub const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/91.0.4472.101 Safari/537.36",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Origin used for relative detail links and for the item URL check
    pub site_origin: String,

    /// Page fetches allowed per window
    pub max_requests: usize,

    /// Length of the sliding rate-limit window (seconds)
    pub window_secs: u64,

    /// Extra wait once the oldest request leaves the window (seconds)
    pub margin_secs: u64,

    /// Pause after each navigation before the page source is read (milliseconds)
    pub settle_delay_ms: u64,

    /// Directory for screenshots taken when a block page shows up
    pub captures_dir: String,

    pub user_agents: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            site_origin: "https://www.olx.pl".to_string(),
            max_requests: 10,
            window_secs: 60,
            margin_secs: 1,
            settle_delay_ms: 2000,
            captures_dir: "captures".to_string(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CrawlerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn margin(&self) -> Duration {
        Duration::from_secs(self.margin_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "olx-scout.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// Loads, parses and validates a configuration file
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a file that does not exist yields the defaults
pub fn load_config_or_default(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config(path)
}

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.max_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "max-requests must be >= 1, got {}",
            crawler.max_requests
        )));
    }

    if crawler.window_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "window-secs must be >= 1, got {}",
            crawler.window_secs
        )));
    }

    if crawler.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one entry".to_string(),
        ));
    }

    if let Some(index) = crawler.user_agents.iter().position(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "user-agents entry {index} is blank"
        )));
    }

    match Url::parse(&crawler.site_origin) {
        Ok(url) if url.host_str().is_some() => {}
        _ => {
            return Err(ConfigError::Validation(format!(
                "site-origin is not an absolute URL: {}",
                crawler.site_origin
            )))
        }
    }

    if config.scheduler.interval_minutes < 1 {
        return Err(ConfigError::Validation(
            "interval-minutes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults_match_crawl_profile() {
        let config = Config::default();
        assert_eq!(config.crawler.max_requests, 10);
        assert_eq!(config.crawler.window(), Duration::from_secs(60));
        assert_eq!(config.crawler.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.crawler.user_agents.len(), 4);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(1800));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let file = create_temp_config(
            r#"
[crawler]
max-requests = 5
settle-delay-ms = 0

[storage]
database-path = "/tmp/scout.db"
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.crawler.max_requests, 5);
        assert_eq!(config.crawler.settle_delay_ms, 0);
        assert_eq!(config.crawler.window_secs, 60);
        assert_eq!(config.storage.database_path, "/tmp/scout.db");
        assert_eq!(config.scheduler.interval_minutes, 30);
    }

    #[test]
    fn test_rejects_zero_request_budget() {
        let file = create_temp_config("[crawler]\nmax-requests = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_relative_origin() {
        let file = create_temp_config("[crawler]\nsite-origin = \"olx.pl\"\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_blank_user_agent() {
        let file = create_temp_config(
            "[crawler]\nuser-agents = [\"\", \"Mozilla/5.0 (X11; Linux x86_64)\"]\n",
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("entry 0")));

        let file = create_temp_config("[crawler]\nuser-agents = []\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let file = create_temp_config("[crawler\nmax-requests = 5");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.crawler.site_origin, "https://www.olx.pl");
    }
}
