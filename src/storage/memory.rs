//! In-memory storage backend.
//!
//! Backs dry runs and tests. [`MemoryStorage::unavailable`] builds a
//! backend whose every call fails, standing in for an unreachable
//! remote store. [`MemoryStorage::read_only`] keeps reads working and
//! refuses writes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{CacheMap, CachedPage, Post};
use crate::storage::{DEFAULT_BATCH_SIZE, PageCacheStore, PostStore, upsert_by_key};

#[derive(Default)]
struct State {
    pages: BTreeMap<String, CachedPage>,
    posts: Vec<Post>,
    upsert_batches: usize,
}

/// Storage kept in process memory.
#[derive(Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
    available: bool,
    writable: bool,
    batch_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            available: true,
            writable: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// A backend that fails every call.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// This handle serves reads and rejects writes. Clones made before
    /// the call still write to the shared state.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Page upsert calls served so far.
    pub fn upsert_batches(&self) -> usize {
        self.state().map(|s| s.upsert_batches).unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        if !self.available {
            return Err(AppError::storage("memory backend unavailable"));
        }
        self.state
            .lock()
            .map_err(|_| AppError::storage("memory backend poisoned"))
    }

    fn state_mut(&self) -> Result<MutexGuard<'_, State>> {
        if !self.writable {
            return Err(AppError::storage("memory backend is read-only"));
        }
        self.state()
    }
}

#[async_trait]
impl PageCacheStore for MemoryStorage {
    async fn load_all(&self) -> Result<CacheMap> {
        Ok(self
            .state()?
            .pages
            .iter()
            .map(|(url, page)| (url.clone(), page.clone()))
            .collect())
    }

    async fn upsert_pages(&self, pages: &[CachedPage]) -> Result<()> {
        let mut state = self.state_mut()?;
        state.upsert_batches += 1;
        for page in pages {
            state.pages.insert(page.url.clone(), page.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.state_mut()?.pages.clear();
        Ok(())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[async_trait]
impl PostStore for MemoryStorage {
    async fn load_all(&self) -> Result<Vec<Post>> {
        Ok(self.state()?.posts.clone())
    }

    async fn upsert_all(&self, posts: &[Post]) -> Result<()> {
        upsert_by_key(&mut self.state_mut()?.posts, posts);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.state_mut()?.posts.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = MemoryStorage::unavailable();
        assert!(PageCacheStore::load_all(&store).await.is_err());
        assert!(store.upsert_pages(&[]).await.is_err());
        assert!(PostStore::load_all(&store).await.is_err());
        assert!(store.upsert_all(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_read_only_serves_reads() {
        let store = MemoryStorage::new();
        let view = store.clone().read_only();
        store.upsert_pages(&[]).await.unwrap();

        assert!(PageCacheStore::load_all(&view).await.is_ok());
        assert!(PostStore::load_all(&view).await.is_ok());
        assert!(view.upsert_pages(&[]).await.is_err());
        assert!(view.upsert_all(&[]).await.is_err());
        assert!(view.delete_all().await.is_err());
        assert_eq!(store.upsert_batches(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStorage::new();
        let handle = store.clone();
        store.upsert_pages(&[]).await.unwrap();
        assert_eq!(handle.upsert_batches(), 1);
    }
}
