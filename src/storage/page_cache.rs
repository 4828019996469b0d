// src/storage/page_cache.rs

//! In-memory page cache and content hashing.
//!
//! Hashing covers a bounded prefix of the raw content only. Pages rarely
//! change without their leading markup changing too, and hashing the
//! whole document is wasted work for a change heuristic.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::{CacheMap, CachedPage, PageMeta};
use crate::utils::text::bounded_prefix;

/// Bytes of raw content that feed the hash.
pub const HASH_PREFIX_BYTES: usize = 5000;

/// Hex characters kept from the digest.
const HASH_LENGTH: usize = 16;

/// Digest of the bounded prefix of `raw`.
pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bounded_prefix(raw, HASH_PREFIX_BYTES).as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(HASH_LENGTH);
    hash
}

/// Page cache owned by one run.
///
/// Mutations stay in memory until the caller hands [`as_map`](Self::as_map)
/// to a [`PageCacheStore`](super::PageCacheStore).
#[derive(Debug, Clone, Default)]
pub struct PageCache {
    entries: CacheMap,
}

impl PageCache {
    pub fn from_map(entries: CacheMap) -> Self {
        Self { entries }
    }

    pub fn as_map(&self) -> &CacheMap {
        &self.entries
    }

    pub fn into_map(self) -> CacheMap {
        self.entries
    }

    pub fn get(&self, url: &str) -> Option<&CachedPage> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `url` is unseen or its stored hash differs from `raw`'s.
    pub fn has_changed(&self, url: &str, raw: &str) -> bool {
        self.entries
            .get(url)
            .is_none_or(|entry| entry.content_hash != content_hash(raw))
    }

    /// Record a fetch of `url` now.
    pub fn update(&mut self, url: &str, raw: &str, meta: PageMeta) {
        self.update_at(url, raw, meta, Utc::now());
    }

    /// Record a fetch of `url` at `now`, overwriting any previous entry.
    ///
    /// `last_crawled_at` never moves backwards.
    pub fn update_at(&mut self, url: &str, raw: &str, meta: PageMeta, now: DateTime<Utc>) {
        let last_crawled_at = self.crawl_time(url, now);
        self.entries.insert(
            url.to_string(),
            CachedPage {
                url: url.to_string(),
                title: meta.title,
                last_crawled_at,
                content_hash: content_hash(raw),
                is_relevant: meta.is_relevant,
                relevant_item_count: meta.relevant_item_count,
                http_status: meta.http_status,
            },
        );
    }

    /// Refresh the timestamp of an entry whose content did not change.
    ///
    /// Returns false when `url` has no entry.
    pub fn touch(&mut self, url: &str, http_status: u16, now: DateTime<Utc>) -> bool {
        let last_crawled_at = self.crawl_time(url, now);
        match self.entries.get_mut(url) {
            Some(entry) => {
                entry.last_crawled_at = last_crawled_at;
                entry.http_status = http_status;
                true
            }
            None => false,
        }
    }

    fn crawl_time(&self, url: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.entries.get(url) {
            Some(previous) if previous.last_crawled_at > now => previous.last_crawled_at,
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(relevant: bool, items: usize) -> PageMeta {
        PageMeta {
            title: "Page".to_string(),
            is_relevant: relevant,
            relevant_item_count: items,
            http_status: 200,
        }
    }

    #[test]
    fn test_hash_is_stable_and_short() {
        let a = content_hash("<html>e-invoicing</html>");
        assert_eq!(a, content_hash("<html>e-invoicing</html>"));
        assert_eq!(a.len(), HASH_LENGTH);
        assert_ne!(a, content_hash("<html>e-facturatie</html>"));
    }

    #[test]
    fn test_hash_ignores_content_past_prefix() {
        let head = "x".repeat(HASH_PREFIX_BYTES);
        assert_eq!(
            content_hash(&format!("{head}tail one")),
            content_hash(&format!("{head}tail two"))
        );
    }

    #[test]
    fn test_unseen_url_has_changed() {
        let cache = PageCache::default();
        assert!(cache.has_changed("https://example.gov/new", ""));
        assert!(cache.has_changed("https://example.gov/new", "<p>anything</p>"));
    }

    #[test]
    fn test_has_changed_after_update() {
        let mut cache = PageCache::default();
        cache.update("https://example.gov/a", "<p>one</p>", meta(false, 0));

        assert!(!cache.has_changed("https://example.gov/a", "<p>one</p>"));
        assert!(cache.has_changed("https://example.gov/a", "<p>two</p>"));
    }

    #[test]
    fn test_update_overwrites_single_entry() {
        let mut cache = PageCache::default();
        let now = Utc::now();
        cache.update_at("https://example.gov/b", "<p>v1</p>", meta(false, 0), now);
        cache.update_at("https://example.gov/b", "<p>v2</p>", meta(true, 2), now);

        assert_eq!(cache.len(), 1);
        let entry = cache.get("https://example.gov/b").unwrap();
        assert!(entry.is_relevant);
        assert_eq!(entry.relevant_item_count, 2);
        assert_eq!(entry.content_hash, content_hash("<p>v2</p>"));
    }

    #[test]
    fn test_crawl_time_is_monotonic() {
        let mut cache = PageCache::default();
        let later = Utc::now();
        let earlier = later - chrono::Duration::hours(1);

        cache.update_at("https://example.gov/c", "x", meta(false, 0), later);
        cache.update_at("https://example.gov/c", "x", meta(false, 0), earlier);
        assert_eq!(cache.get("https://example.gov/c").unwrap().last_crawled_at, later);

        assert!(cache.touch("https://example.gov/c", 200, earlier));
        assert_eq!(cache.get("https://example.gov/c").unwrap().last_crawled_at, later);
    }

    #[test]
    fn test_touch_keeps_meta() {
        let mut cache = PageCache::default();
        let now = Utc::now();
        cache.update_at("https://example.gov/d", "x", meta(true, 3), now);

        let later = now + chrono::Duration::days(30);
        assert!(cache.touch("https://example.gov/d", 200, later));
        let entry = cache.get("https://example.gov/d").unwrap();
        assert_eq!(entry.last_crawled_at, later);
        assert_eq!(entry.relevant_item_count, 3);

        assert!(!cache.touch("https://example.gov/missing", 200, later));
    }
}
