//! Crawl run modes and statistics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which traversal policy a run uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    Full,
    Incremental,
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlMode::Full => write!(f, "full"),
            CrawlMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Statistics of one completed crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub mode: CrawlMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// URLs enumerated by the crawler
    pub pages_discovered: usize,
    /// URLs skipped thanks to a fresh cache entry
    pub pages_skipped: usize,
    /// Stale or unseen URLs left for a later run by the fetch cap
    pub pages_deferred: usize,
    /// URLs fetched for content
    pub pages_fetched: usize,
    /// Fetched URLs whose bounded prefix hash did not change
    pub pages_unchanged: usize,
    /// Fetched URLs that contained qualifying content
    pub pages_relevant: usize,
    /// Traversal fetches that failed
    pub crawl_failures: usize,
    /// Content fetches that failed
    pub fetch_failures: usize,
    /// `pages_skipped / pages_discovered`
    pub cache_hit_rate: f64,
    /// Candidate items that passed verification
    pub candidates_found: usize,
    pub new_posts: usize,
    pub total_posts: usize,
    /// Whether the page cache reached durable storage
    pub cache_persisted: bool,
    /// Whether the post store accepted the merged posts
    pub posts_persisted: bool,
}

impl RunStats {
    /// Zeroed statistics for a run starting at `start_time`.
    pub fn new(mode: CrawlMode, start_time: DateTime<Utc>) -> Self {
        Self {
            mode,
            start_time,
            end_time: start_time,
            pages_discovered: 0,
            pages_skipped: 0,
            pages_deferred: 0,
            pages_fetched: 0,
            pages_unchanged: 0,
            pages_relevant: 0,
            crawl_failures: 0,
            fetch_failures: 0,
            cache_hit_rate: 0.0,
            candidates_found: 0,
            new_posts: 0,
            total_posts: 0,
            cache_persisted: false,
            posts_persisted: false,
        }
    }

    /// Key/value rows for a summary block.
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Mode", self.mode.to_string()),
            (
                "Duration",
                format!("{}s", (self.end_time - self.start_time).num_seconds()),
            ),
            ("Pages discovered", self.pages_discovered.to_string()),
            ("Pages skipped (cache)", self.pages_skipped.to_string()),
            ("Pages deferred (cap)", self.pages_deferred.to_string()),
            ("Pages fetched", self.pages_fetched.to_string()),
            ("Pages unchanged", self.pages_unchanged.to_string()),
            ("Relevant pages", self.pages_relevant.to_string()),
            (
                "Failures (crawl/fetch)",
                format!("{}/{}", self.crawl_failures, self.fetch_failures),
            ),
            (
                "Cache hit rate",
                format!("{:.1}%", self.cache_hit_rate * 100.0),
            ),
            ("New posts", self.new_posts.to_string()),
            ("Total posts", self.total_posts.to_string()),
        ]
    }
}

/// Result of asking the orchestrator for a run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run went through all pipeline steps.
    Completed(RunStats),
    /// Another run held the store; nothing was done.
    AlreadyRunning,
}

impl RunOutcome {
    /// Statistics of a completed run.
    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            RunOutcome::Completed(stats) => Some(stats),
            RunOutcome::AlreadyRunning => None,
        }
    }
}
