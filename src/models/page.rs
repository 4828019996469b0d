//! Page cache entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-memory page cache keyed by normalized URL.
pub type CacheMap = HashMap<String, CachedPage>;

/// Crawl metadata remembered for one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedPage {
    /// Normalized page URL (unique key)
    pub url: String,

    /// Best-effort page label
    #[serde(default)]
    pub title: String,

    /// Time of the most recent fetch
    pub last_crawled_at: DateTime<Utc>,

    /// Digest of the bounded content prefix
    pub content_hash: String,

    /// Whether the last fetch contained qualifying content
    #[serde(default)]
    pub is_relevant: bool,

    /// Number of qualifying items found on the last fetch
    #[serde(default)]
    pub relevant_item_count: usize,

    /// Last observed HTTP status
    #[serde(default)]
    pub http_status: u16,
}

impl CachedPage {
    /// Whether the entry is older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_crawled_at > max_age
    }
}

/// Fetch outcome recorded alongside the content hash.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub title: String,
    pub is_relevant: bool,
    pub relevant_item_count: usize,
    pub http_status: u16,
}
