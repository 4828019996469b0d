//! Local filesystem storage implementation.
//!
//! Each collection is one pretty-printed JSON file written atomically
//! (temp file, then rename). Upserts read, merge and rewrite the file
//! under a lock so concurrent writers from the same process never lose
//! entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CacheMap, CachedPage, Post};
use crate::storage::{
    Collection, DEFAULT_BATCH_SIZE, Keyed, PageCacheStore, PostStore, upsert_by_key,
};

const PAGE_CACHE_FILE: &str = "page_cache.json";
const POSTS_FILE: &str = "posts.json";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    batch_size: usize,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::with_batch_size(root_dir, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(root_dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            batch_size,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_entries<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self
            .read_json::<Collection<T>>(key)
            .await?
            .map(|c| c.entries)
            .unwrap_or_default())
    }

    async fn upsert_entries<T>(&self, key: &str, incoming: &[T]) -> Result<()>
    where
        T: Keyed + Clone + Serialize + DeserializeOwned,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries: Vec<T> = self.load_entries(key).await?;
        upsert_by_key(&mut entries, incoming);
        self.write_json(key, &Collection::new(entries)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl PageCacheStore for LocalStorage {
    async fn load_all(&self) -> Result<CacheMap> {
        let pages: Vec<CachedPage> = self.load_entries(PAGE_CACHE_FILE).await?;
        Ok(pages.into_iter().map(|p| (p.url.clone(), p)).collect())
    }

    async fn upsert_pages(&self, pages: &[CachedPage]) -> Result<()> {
        self.upsert_entries(PAGE_CACHE_FILE, pages).await
    }

    async fn clear(&self) -> Result<()> {
        self.remove(PAGE_CACHE_FILE).await
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn describe(&self) -> String {
        self.path(PAGE_CACHE_FILE).display().to_string()
    }
}

#[async_trait]
impl PostStore for LocalStorage {
    async fn load_all(&self) -> Result<Vec<Post>> {
        self.load_entries(POSTS_FILE).await
    }

    async fn upsert_all(&self, posts: &[Post]) -> Result<()> {
        self.upsert_entries(POSTS_FILE, posts).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.remove(POSTS_FILE).await
    }

    fn describe(&self) -> String {
        self.path(POSTS_FILE).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::models::{ContentItem, PageMeta};
    use crate::storage::PageCache;

    fn cache_map(urls: &[&str]) -> CacheMap {
        let mut cache = PageCache::default();
        for url in urls {
            cache.update(url, &format!("<p>{url}</p>"), PageMeta::default());
        }
        cache.into_map()
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_cache_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("never-created"));

        assert!(PageCacheStore::load_all(&storage).await.unwrap().is_empty());
        assert!(PostStore::load_all(&storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_all_twice_is_set_equal() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_batch_size(tmp.path(), 2);
        let map = cache_map(&[
            "https://example.gov/a",
            "https://example.gov/b",
            "https://example.gov/c",
        ]);

        storage.save_all(&map).await.unwrap();
        storage.save_all(&map).await.unwrap();

        let loaded = PageCacheStore::load_all(&storage).await.unwrap();
        assert_eq!(loaded, map);

        let raw: Collection<CachedPage> =
            storage.read_json(PAGE_CACHE_FILE).await.unwrap().unwrap();
        assert_eq!(raw.count, 3);
    }

    #[tokio::test]
    async fn test_post_upsert_and_delete() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let post = Post::admit(
            ContentItem {
                url: "https://example.gov/news/1".into(),
                title: "Peppol".into(),
                text_excerpt: String::new(),
                published_at: None,
            },
            Utc::now(),
        );

        storage.upsert_all(&[post.clone()]).await.unwrap();
        storage.upsert_all(&[post.clone()]).await.unwrap();
        assert_eq!(PostStore::load_all(&storage).await.unwrap(), vec![post]);

        storage.delete_all().await.unwrap();
        assert!(PostStore::load_all(&storage).await.unwrap().is_empty());
        // Deleting an absent collection is fine.
        storage.delete_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_all_entries() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let first = cache_map(&["https://example.gov/1"]);
        let second = cache_map(&["https://example.gov/2"]);

        let (a, b) = tokio::join!(storage.save_all(&first), storage.save_all(&second));
        a.unwrap();
        b.unwrap();

        assert_eq!(PageCacheStore::load_all(&storage).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.write_bytes(PAGE_CACHE_FILE, b"{not json").await.unwrap();

        assert!(PageCacheStore::load_all(&storage).await.is_err());
    }
}
