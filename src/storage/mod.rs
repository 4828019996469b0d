//! Persistence for the two independent keyed collections.
//!
//! - Page cache: crawl metadata per URL, invisible to end consumers
//! - Posts: the user-facing result set
//!
//! Both are upserted by URL. Backends implement [`PageCacheStore`] and
//! [`PostStore`]; the orchestrator never knows which one it talks to.
//!
//! ## Local Layout
//!
//! ```text
//! {dir}/
//! ├── page_cache.json   # CachedPage entries
//! └── posts.json        # Post entries
//! ```

pub mod fallback;
pub mod local;
pub mod memory;
pub mod page_cache;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CacheMap, CachedPage, Config, Post};

pub use fallback::FallbackStore;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use page_cache::{HASH_PREFIX_BYTES, PageCache, content_hash};
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// Entries per upsert request unless a backend says otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Durable page cache keyed by URL.
#[async_trait]
pub trait PageCacheStore: Send + Sync {
    /// Load every entry. An absent cache is an empty map, not an error.
    async fn load_all(&self) -> Result<CacheMap>;

    /// Insert or overwrite entries by URL.
    async fn upsert_pages(&self, pages: &[CachedPage]) -> Result<()>;

    /// Drop the whole cache.
    async fn clear(&self) -> Result<()>;

    /// Largest slice passed to a single [`upsert_pages`](Self::upsert_pages).
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;

    /// Persist the full map in batches.
    ///
    /// Upserts only, so a retry after a partial failure never duplicates.
    async fn save_all(&self, map: &CacheMap) -> Result<()> {
        let mut pages: Vec<CachedPage> = map.values().cloned().collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));

        for batch in pages.chunks(self.batch_size().max(1)) {
            self.upsert_pages(batch).await?;
        }
        log::debug!("Saved {} cache entries to {}", pages.len(), self.describe());
        Ok(())
    }
}

/// Durable post collection keyed by URL.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Post>>;

    /// Insert or overwrite posts by URL.
    async fn upsert_all(&self, posts: &[Post]) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Entries keyed by URL in a stored collection.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for CachedPage {
    fn key(&self) -> &str {
        &self.url
    }
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.url
    }
}

/// On-disk envelope of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    /// ISO 8601 timestamp of last update
    pub updated_at: DateTime<Utc>,
    /// Entry count
    pub count: usize,
    pub entries: Vec<T>,
}

impl<T> Collection<T> {
    pub fn new(entries: Vec<T>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: entries.len(),
            entries,
        }
    }
}

/// Upsert `incoming` into `existing` by key, keeping one entry per key.
///
/// Entries keep their position; new keys are appended in input order.
pub fn upsert_by_key<T: Keyed + Clone>(existing: &mut Vec<T>, incoming: &[T]) {
    let mut positions: std::collections::HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, e)| (e.key().to_string(), i))
        .collect();

    for entry in incoming {
        match positions.get(entry.key()) {
            Some(&i) => existing[i] = entry.clone(),
            None => {
                positions.insert(entry.key().to_string(), existing.len());
                existing.push(entry.clone());
            }
        }
    }
}

/// The stores one run reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub cache: Arc<dyn PageCacheStore>,
    pub posts: Arc<dyn PostStore>,
}

impl Stores {
    /// Use one backend for both collections.
    pub fn single<S>(backend: S) -> Self
    where
        S: PageCacheStore + PostStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            cache: backend.clone(),
            posts: backend,
        }
    }
}

/// Build the stores described by the configuration.
///
/// With the `s3` feature and a bucket configured, S3 is primary and the
/// local directory catches whatever S3 refuses.
pub async fn build_stores(config: &Config) -> Result<Stores> {
    let local = LocalStorage::with_batch_size(&config.storage.dir, config.storage.batch_size);

    #[cfg(feature = "s3")]
    if let Some(bucket) = &config.storage.s3_bucket {
        let s3 = S3Storage::from_env(bucket, &config.storage.s3_prefix)
            .await
            .with_batch_size(config.storage.batch_size);
        log::info!("Using {} with fallback {}", PostStore::describe(&s3), PostStore::describe(&local));
        return Ok(Stores::single(FallbackStore::new(s3, local)));
    }

    #[cfg(not(feature = "s3"))]
    if config.storage.s3_bucket.is_some() {
        log::warn!("s3_bucket is set but the s3 feature is disabled; using local storage");
    }

    Ok(Stores::single(local))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{ContentItem, PostStatus};

    fn post(url: &str, title: &str) -> Post {
        Post::admit(
            ContentItem {
                url: url.to_string(),
                title: title.to_string(),
                text_excerpt: String::new(),
                published_at: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_upsert_by_key_overwrites_in_place() {
        let mut existing = vec![post("https://a", "A"), post("https://b", "B")];
        let mut changed = post("https://a", "A2");
        changed.status = PostStatus::Existing;

        upsert_by_key(&mut existing, &[changed, post("https://c", "C"), post("https://c", "C2")]);

        let titles: Vec<_> = existing.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A2", "B", "C2"]);
        assert_eq!(existing[0].status, PostStatus::Existing);
    }

    #[tokio::test]
    async fn test_save_all_respects_batch_size() {
        let store = MemoryStorage::new().with_batch_size(2);
        let mut map = CacheMap::new();
        let now = Utc::now();
        let mut cache = PageCache::from_map(CacheMap::new());
        for i in 0..5 {
            cache.update_at(&format!("https://example.gov/{i}"), "<p>x</p>", Default::default(), now);
        }
        map.extend(cache.into_map());

        store.save_all(&map).await.unwrap();

        assert_eq!(store.upsert_batches(), 3);
        assert_eq!(PageCacheStore::load_all(&store).await.unwrap(), map);
    }
}
