//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};
use crate::models::CrawlMode;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Deep crawl settings
    #[serde(
        default = "defaults::full_mode",
        deserialize_with = "ModeConfig::deserialize_full"
    )]
    pub full: ModeConfig,

    /// Shallow periodic crawl settings
    #[serde(
        default = "defaults::incremental_mode",
        deserialize_with = "ModeConfig::deserialize_incremental"
    )]
    pub incremental: ModeConfig,

    /// Relevance classification settings
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Post-run notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Periodic trigger settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Write this configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Settings for the given crawl mode.
    pub fn mode(&self, mode: CrawlMode) -> &ModeConfig {
        match mode {
            CrawlMode::Full => &self.full,
            CrawlMode::Incremental => &self.incremental,
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        let start = url::Url::parse(&self.crawler.start_url)?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(AppError::validation(
                "crawler.start_url must be an http(s) URL",
            ));
        }
        if let Some(proxy) = &self.crawler.proxy_url {
            url::Url::parse(proxy)?;
        }
        for (name, mode) in [("full", &self.full), ("incremental", &self.incremental)] {
            if mode.max_age_days == 0 {
                return Err(AppError::validation(format!(
                    "{name}.max_age_days must be > 0"
                )));
            }
            if mode.max_fetch == Some(0) {
                return Err(AppError::validation(format!(
                    "{name}.max_fetch must be > 0 when set"
                )));
            }
        }
        if self.incremental.max_fetch.is_none() {
            return Err(AppError::validation("incremental.max_fetch must be set"));
        }
        if self.incremental.max_depth > self.full.max_depth {
            return Err(AppError::validation(
                "incremental.max_depth must not exceed full.max_depth",
            ));
        }
        if self.matcher.min_strong_indicators == 0 {
            return Err(AppError::validation(
                "matcher.min_strong_indicators must be > 0",
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(AppError::validation("storage.batch_size must be > 0"));
        }
        if self.schedule.incremental_every_mins == 0 {
            return Err(AppError::validation(
                "schedule.incremental_every_mins must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            full: defaults::full_mode(),
            incremental: defaults::incremental_mode(),
            matcher: MatcherConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Entry point of the breadth-first traversal
    #[serde(default = "defaults::start_url")]
    pub start_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Base URL of a scrape proxy (`/api/scrape?url=`); direct fetches when unset
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            start_url: defaults::start_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            proxy_url: None,
        }
    }
}

/// Traversal and staleness policy of one crawl mode.
///
/// Keys missing from a `[full]` or `[incremental]` section keep that
/// mode's own defaults.
#[derive(Debug, Clone, Serialize)]
pub struct ModeConfig {
    /// Deepest link level followed from the start URL
    pub max_depth: usize,

    /// Cache entries older than this are refetched
    pub max_age_days: u32,

    /// Upper bound on pages fetched per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fetch: Option<usize>,

    /// Persist the page cache every N fetched pages (0 disables)
    pub checkpoint_every: usize,
}

/// Keys present in one mode section.
#[derive(Debug, Deserialize)]
struct ModeOverrides {
    max_depth: Option<usize>,
    max_age_days: Option<u32>,
    max_fetch: Option<usize>,
    checkpoint_every: Option<usize>,
}

impl ModeOverrides {
    fn over(self, base: ModeConfig) -> ModeConfig {
        ModeConfig {
            max_depth: self.max_depth.unwrap_or(base.max_depth),
            max_age_days: self.max_age_days.unwrap_or(base.max_age_days),
            max_fetch: self.max_fetch.or(base.max_fetch),
            checkpoint_every: self.checkpoint_every.unwrap_or(base.checkpoint_every),
        }
    }
}

impl ModeConfig {
    fn deserialize_full<'de, D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ModeOverrides::deserialize(deserializer)?.over(defaults::full_mode()))
    }

    fn deserialize_incremental<'de, D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ModeOverrides::deserialize(deserializer)?.over(defaults::incremental_mode()))
    }
}

/// Relevance classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Body length below which a title-only match is rejected
    #[serde(default = "defaults::min_body_length")]
    pub min_body_length: usize,

    /// Strong indicators the local fallback needs to accept an item
    #[serde(default = "defaults::min_strong_indicators")]
    pub min_strong_indicators: usize,

    /// Base URL of the verification service (`/api/verify-llm`)
    #[serde(default)]
    pub oracle_url: Option<String>,

    /// Minimum spacing between oracle calls in milliseconds
    #[serde(default = "defaults::oracle_interval")]
    pub oracle_interval_ms: u64,

    /// Oracle request timeout in seconds
    #[serde(default = "defaults::oracle_timeout")]
    pub oracle_timeout_secs: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_body_length: defaults::min_body_length(),
            min_strong_indicators: defaults::min_strong_indicators(),
            oracle_url: None,
            oracle_interval_ms: defaults::oracle_interval(),
            oracle_timeout_secs: defaults::oracle_timeout(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the local JSON stores
    #[serde(default = "defaults::storage_dir")]
    pub dir: String,

    /// Entries per upsert request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// S3 bucket used as primary store when the `s3` feature is enabled
    #[serde(default)]
    pub s3_bucket: Option<String>,

    /// Key prefix inside the S3 bucket
    #[serde(default = "defaults::s3_prefix")]
    pub s3_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            batch_size: defaults::batch_size(),
            s3_bucket: None,
            s3_prefix: defaults::s3_prefix(),
        }
    }
}

/// Post-run notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Endpoint receiving a JSON summary of new posts
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Periodic trigger settings used by `watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between incremental runs
    #[serde(default = "defaults::incremental_every")]
    pub incremental_every_mins: u64,

    /// Hours between full runs (0 disables them)
    #[serde(default = "defaults::full_every")]
    pub full_every_hours: u64,
}

impl ScheduleConfig {
    pub fn incremental_period(&self) -> Duration {
        Duration::from_secs(self.incremental_every_mins * 60)
    }

    /// Period of full runs, `None` when they are disabled.
    pub fn full_period(&self) -> Option<Duration> {
        (self.full_every_hours > 0).then(|| Duration::from_secs(self.full_every_hours * 3600))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            incremental_every_mins: defaults::incremental_every(),
            full_every_hours: defaults::full_every(),
        }
    }
}

mod defaults {
    use super::ModeConfig;

    // Crawler defaults
    pub fn start_url() -> String {
        "https://finance.belgium.be/en/enterprises/vat/e-invoicing".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; einvoice-watch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }

    // Mode defaults
    pub fn full_mode() -> ModeConfig {
        ModeConfig {
            max_depth: 4,
            max_age_days: 21,
            max_fetch: None,
            checkpoint_every: checkpoint_every(),
        }
    }
    pub fn incremental_mode() -> ModeConfig {
        ModeConfig {
            max_depth: 1,
            max_age_days: 3,
            max_fetch: Some(50),
            checkpoint_every: checkpoint_every(),
        }
    }
    pub fn checkpoint_every() -> usize {
        25
    }

    // Matcher defaults
    pub fn min_body_length() -> usize {
        100
    }
    pub fn min_strong_indicators() -> usize {
        1
    }
    pub fn oracle_interval() -> u64 {
        500
    }
    pub fn oracle_timeout() -> u64 {
        10
    }

    // Storage defaults
    pub fn storage_dir() -> String {
        "storage".into()
    }
    pub fn batch_size() -> usize {
        500
    }
    pub fn s3_prefix() -> String {
        "einvoice-watch".into()
    }

    // Schedule defaults
    pub fn incremental_every() -> u64 {
        60
    }
    pub fn full_every() -> u64 {
        24 * 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_modes_differ_in_depth_and_window() {
        let config = Config::default();
        assert!(config.full.max_depth > config.incremental.max_depth);
        assert!(config.full.max_age_days > config.incremental.max_age_days);
        assert!(config.full.max_fetch.is_none());
        assert!(config.incremental.max_fetch.is_some());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_start_url() {
        let mut config = Config::default();
        config.crawler.start_url = "ftp://example.com/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_fetch_cap() {
        let mut config = Config::default();
        config.incremental.max_fetch = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            start_url = "https://example.gov/news"

            [incremental]
            max_depth = 2
            max_age_days = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.start_url, "https://example.gov/news");
        assert_eq!(config.crawler.request_delay_ms, 1000);
        assert_eq!(config.incremental.max_depth, 2);
        assert_eq!(config.incremental.max_fetch, Some(50));
        assert_eq!(config.incremental.checkpoint_every, 25);
        assert_eq!(config.full.max_depth, 4);
        assert_eq!(config.mode(CrawlMode::Full).max_age_days, 21);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_full_section_keeps_full_defaults() {
        let config: Config = toml::from_str("[full]\nmax_depth = 6\n").unwrap();

        assert_eq!(config.full.max_depth, 6);
        assert_eq!(config.full.max_age_days, 21);
        assert_eq!(config.full.max_fetch, None);
        assert_eq!(config.incremental.max_fetch, Some(50));
    }

    #[test]
    fn validate_requires_incremental_fetch_cap() {
        let mut config = Config::default();
        config.incremental.max_fetch = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_full_interval_disables_full_runs() {
        let config: Config = toml::from_str("[schedule]\nfull_every_hours = 0\n").unwrap();
        assert_eq!(config.schedule.full_period(), None);
        assert_eq!(
            Config::default().schedule.full_period(),
            Some(Duration::from_secs(168 * 3600))
        );
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.toml");
        Config::default().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage.batch_size, 500);
        assert_eq!(loaded.schedule.full_every_hours, 168);
        assert_eq!(loaded.incremental.max_fetch, Some(50));
        assert_eq!(loaded.full.max_fetch, None);
    }
}
