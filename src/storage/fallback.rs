//! Primary/fallback composite store.
//!
//! Writes go to the primary first. When it fails the error is logged and
//! the write lands in the fallback instead. Reads merge both backends with
//! fallback entries winning, so a write the primary refused stays visible.
//! The next successful primary write moves the fallback entries over and
//! empties the fallback.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CacheMap, CachedPage, Post};
use crate::storage::{PageCacheStore, PostStore, upsert_by_key};

/// Store that degrades from `primary` to `fallback`.
pub struct FallbackStore<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackStore<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: PageCacheStore, F: PageCacheStore> FallbackStore<P, F> {
    /// Move pending fallback pages not covered by `written` into the primary.
    async fn drain_pages(&self, written: &[CachedPage]) {
        let pending = match self.fallback.load_all().await {
            Ok(map) if map.is_empty() => return,
            Ok(map) => map,
            Err(e) => {
                log::debug!("Page cache fallback {} unreadable: {}", self.fallback.describe(), e);
                return;
            }
        };
        let written: HashSet<&str> = written.iter().map(|p| p.url.as_str()).collect();
        let carried: CacheMap = pending
            .into_iter()
            .filter(|(url, _)| !written.contains(url.as_str()))
            .collect();

        if let Err(e) = self.primary.save_all(&carried).await {
            log::warn!("Page cache sync to {} failed: {}", self.primary.describe(), e);
            return;
        }
        match self.fallback.clear().await {
            Ok(()) => log::info!(
                "Moved {} cache entries from {} to {}",
                carried.len(),
                self.fallback.describe(),
                self.primary.describe()
            ),
            Err(e) => log::warn!("Page cache fallback {} not cleared: {}", self.fallback.describe(), e),
        }
    }
}

#[async_trait]
impl<P: PageCacheStore, F: PageCacheStore> PageCacheStore for FallbackStore<P, F> {
    async fn load_all(&self) -> Result<CacheMap> {
        let mut map = match self.primary.load_all().await {
            Ok(map) => map,
            Err(e) => {
                log::warn!(
                    "Page cache load from {} failed, using {}: {}",
                    self.primary.describe(),
                    self.fallback.describe(),
                    e
                );
                return self.fallback.load_all().await;
            }
        };
        match self.fallback.load_all().await {
            Ok(pending) => map.extend(pending),
            Err(e) => log::warn!("Page cache fallback {} unreadable: {}", self.fallback.describe(), e),
        }
        Ok(map)
    }

    async fn upsert_pages(&self, pages: &[CachedPage]) -> Result<()> {
        match self.primary.upsert_pages(pages).await {
            Ok(()) => {
                self.drain_pages(pages).await;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Page cache write to {} failed, using {}: {}",
                    self.primary.describe(),
                    self.fallback.describe(),
                    e
                );
                self.fallback.upsert_pages(pages).await
            }
        }
    }

    async fn clear(&self) -> Result<()> {
        let primary = self.primary.clear().await;
        let fallback = self.fallback.clear().await;
        primary.and(fallback)
    }

    fn batch_size(&self) -> usize {
        self.primary.batch_size().min(self.fallback.batch_size())
    }

    fn describe(&self) -> String {
        format!("{} (fallback {})", self.primary.describe(), self.fallback.describe())
    }
}

impl<P: PostStore, F: PostStore> FallbackStore<P, F> {
    /// Move pending fallback posts not covered by `written` into the primary.
    async fn drain_posts(&self, written: &[Post]) {
        let pending = match PostStore::load_all(&self.fallback).await {
            Ok(posts) if posts.is_empty() => return,
            Ok(posts) => posts,
            Err(e) => {
                log::debug!("Post fallback {} unreadable: {}", PostStore::describe(&self.fallback), e);
                return;
            }
        };
        let written: HashSet<&str> = written.iter().map(|p| p.url.as_str()).collect();
        let carried: Vec<Post> = pending
            .into_iter()
            .filter(|p| !written.contains(p.url.as_str()))
            .collect();

        if let Err(e) = self.primary.upsert_all(&carried).await {
            log::warn!("Post sync to {} failed: {}", PostStore::describe(&self.primary), e);
            return;
        }
        match self.fallback.delete_all().await {
            Ok(()) => log::info!(
                "Moved {} posts from {} to {}",
                carried.len(),
                PostStore::describe(&self.fallback),
                PostStore::describe(&self.primary)
            ),
            Err(e) => log::warn!("Post fallback {} not cleared: {}", PostStore::describe(&self.fallback), e),
        }
    }
}

#[async_trait]
impl<P: PostStore, F: PostStore> PostStore for FallbackStore<P, F> {
    async fn load_all(&self) -> Result<Vec<Post>> {
        let mut posts = match self.primary.load_all().await {
            Ok(posts) => posts,
            Err(e) => {
                log::warn!(
                    "Post load from {} failed, using {}: {}",
                    self.primary.describe(),
                    self.fallback.describe(),
                    e
                );
                return self.fallback.load_all().await;
            }
        };
        match self.fallback.load_all().await {
            Ok(pending) => upsert_by_key(&mut posts, &pending),
            Err(e) => log::warn!("Post fallback {} unreadable: {}", self.fallback.describe(), e),
        }
        Ok(posts)
    }

    async fn upsert_all(&self, posts: &[Post]) -> Result<()> {
        match self.primary.upsert_all(posts).await {
            Ok(()) => {
                self.drain_posts(posts).await;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Post write to {} failed, using {}: {}",
                    self.primary.describe(),
                    self.fallback.describe(),
                    e
                );
                self.fallback.upsert_all(posts).await
            }
        }
    }

    async fn delete_all(&self) -> Result<()> {
        let primary = self.primary.delete_all().await;
        let fallback = self.fallback.delete_all().await;
        primary.and(fallback)
    }

    fn describe(&self) -> String {
        format!("{} (fallback {})", self.primary.describe(), self.fallback.describe())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{ContentItem, PageMeta, PostStatus};
    use crate::storage::{MemoryStorage, PageCache};

    fn post(url: &str, title: &str) -> Post {
        Post::admit(
            ContentItem {
                url: url.into(),
                title: title.into(),
                text_excerpt: String::new(),
                published_at: None,
            },
            Utc::now(),
        )
    }

    fn page(url: &str, raw: &str) -> CachedPage {
        let mut cache = PageCache::default();
        cache.update(url, raw, PageMeta::default());
        cache.into_map().remove(url).unwrap()
    }

    #[tokio::test]
    async fn test_primary_serves_when_healthy() {
        let primary = MemoryStorage::new();
        let fallback = MemoryStorage::new();
        let store = FallbackStore::new(primary.clone(), fallback.clone());

        store.upsert_all(&[post("https://example.gov/a", "A")]).await.unwrap();

        assert_eq!(PostStore::load_all(&primary).await.unwrap().len(), 1);
        assert!(PostStore::load_all(&fallback).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_primary_is_transparent() {
        let fallback = MemoryStorage::new();
        let store = FallbackStore::new(MemoryStorage::unavailable(), fallback.clone());

        store.upsert_all(&[post("https://example.gov/a", "A")]).await.unwrap();
        assert_eq!(PostStore::load_all(&store).await.unwrap().len(), 1);
        assert_eq!(PostStore::load_all(&fallback).await.unwrap().len(), 1);

        let mut cache = PageCache::default();
        cache.update("https://example.gov/a", "x", PageMeta::default());
        store.save_all(cache.as_map()).await.unwrap();
        assert_eq!(PageCacheStore::load_all(&fallback).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_post_write_stays_visible() {
        let primary = MemoryStorage::new();
        let fallback = MemoryStorage::new();
        let store = FallbackStore::new(primary.clone().read_only(), fallback.clone());

        store.upsert_all(&[post("https://example.gov/a", "A")]).await.unwrap();

        assert!(PostStore::load_all(&primary).await.unwrap().is_empty());
        let visible = PostStore::load_all(&store).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].status, PostStatus::New);
    }

    #[tokio::test]
    async fn test_fallback_entries_win_on_load() {
        let primary = MemoryStorage::new();
        let fallback = MemoryStorage::new();
        primary.upsert_all(&[post("https://example.gov/a", "old")]).await.unwrap();
        fallback.upsert_all(&[post("https://example.gov/a", "new")]).await.unwrap();
        primary.upsert_pages(&[page("https://example.gov/a", "old")]).await.unwrap();
        fallback.upsert_pages(&[page("https://example.gov/a", "new")]).await.unwrap();
        let store = FallbackStore::new(primary, fallback);

        let posts = PostStore::load_all(&store).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "new");

        let pages = PageCacheStore::load_all(&store).await.unwrap();
        assert_eq!(
            pages["https://example.gov/a"].content_hash,
            page("https://example.gov/a", "new").content_hash
        );
    }

    #[tokio::test]
    async fn test_recovered_primary_absorbs_fallback() {
        let primary = MemoryStorage::new();
        let fallback = MemoryStorage::new();

        let degraded = FallbackStore::new(primary.clone().read_only(), fallback.clone());
        degraded.upsert_all(&[post("https://example.gov/a", "A")]).await.unwrap();
        degraded.upsert_pages(&[page("https://example.gov/a", "x")]).await.unwrap();

        let recovered = FallbackStore::new(primary.clone(), fallback.clone());
        recovered.upsert_all(&[post("https://example.gov/b", "B")]).await.unwrap();
        recovered.upsert_pages(&[page("https://example.gov/b", "y")]).await.unwrap();

        assert_eq!(PostStore::load_all(&primary).await.unwrap().len(), 2);
        assert_eq!(PageCacheStore::load_all(&primary).await.unwrap().len(), 2);
        assert!(PostStore::load_all(&fallback).await.unwrap().is_empty());
        assert!(PageCacheStore::load_all(&fallback).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_keeps_newer_write() {
        let primary = MemoryStorage::new();
        let fallback = MemoryStorage::new();
        fallback.upsert_all(&[post("https://example.gov/a", "stale")]).await.unwrap();

        let store = FallbackStore::new(primary.clone(), fallback);
        store.upsert_all(&[post("https://example.gov/a", "fresh")]).await.unwrap();

        let posts = PostStore::load_all(&primary).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "fresh");
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_error() {
        let store = FallbackStore::new(MemoryStorage::unavailable(), MemoryStorage::unavailable());
        assert!(PostStore::load_all(&store).await.is_err());
        assert!(store.upsert_pages(&[]).await.is_err());
    }
}
