//! AWS S3 storage implementation.
//!
//! Each collection is one JSON object under the configured prefix:
//! - `{prefix}/page_cache.json`
//! - `{prefix}/posts.json`
//!
//! Upserts read the object, merge by URL and write it back.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CacheMap, CachedPage, Post};
use crate::storage::{
    Collection, DEFAULT_BATCH_SIZE, Keyed, PageCacheStore, PostStore, upsert_by_key,
};

/// S3-backed storage for both collections.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    batch_size: usize,
    write_lock: Arc<Mutex<()>>,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create S3 storage with credentials and region from the environment.
    pub async fn from_env(bucket: &str, prefix: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn key(&self, name: &str) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Read a collection, returning an empty one when the object is absent.
    async fn read_entries<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::storage(format!("{}: {}", self.location(key), e)))?;
                let collection: Collection<T> = serde_json::from_slice(&bytes.into_bytes())?;
                Ok(collection.entries)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::info!("No existing data at {}", self.location(key));
                    Ok(Vec::new())
                } else {
                    Err(AppError::storage(format!(
                        "{}: {}",
                        self.location(key),
                        service_err
                    )))
                }
            }
        }
    }

    async fn write_entries<T: Serialize>(&self, key: &str, entries: Vec<T>) -> Result<()> {
        let count = entries.len();
        let json = serde_json::to_vec_pretty(&Collection::new(entries))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(json))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::storage(format!("{}: {}", self.location(key), e)))?;

        log::debug!("Wrote {} entries to {}", count, self.location(key));
        Ok(())
    }

    async fn upsert_entries<T>(&self, key: &str, incoming: &[T]) -> Result<()>
    where
        T: Keyed + Clone + Serialize + DeserializeOwned + Send + Sync,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries: Vec<T> = self.read_entries(key).await?;
        upsert_by_key(&mut entries, incoming);
        self.write_entries(key, entries).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("{}: {}", self.location(key), e)))?;

        log::info!("Deleted {}", self.location(key));
        Ok(())
    }
}

#[async_trait]
impl PageCacheStore for S3Storage {
    async fn load_all(&self) -> Result<CacheMap> {
        let pages: Vec<CachedPage> = self.read_entries(&self.key("page_cache.json")).await?;
        Ok(pages.into_iter().map(|p| (p.url.clone(), p)).collect())
    }

    async fn upsert_pages(&self, pages: &[CachedPage]) -> Result<()> {
        self.upsert_entries(&self.key("page_cache.json"), pages).await
    }

    async fn clear(&self) -> Result<()> {
        self.delete_object(&self.key("page_cache.json")).await
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn describe(&self) -> String {
        self.location(&self.key("page_cache.json"))
    }
}

#[async_trait]
impl PostStore for S3Storage {
    async fn load_all(&self) -> Result<Vec<Post>> {
        self.read_entries(&self.key("posts.json")).await
    }

    async fn upsert_all(&self, posts: &[Post]) -> Result<()> {
        self.upsert_entries(&self.key("posts.json"), posts).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.delete_object(&self.key("posts.json")).await
    }

    fn describe(&self) -> String {
        self.location(&self.key("posts.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(prefix: &str) -> S3Storage {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("eu-west-1"))
            .build();
        S3Storage::new(Client::from_conf(config), "bucket", prefix)
    }

    #[test]
    fn test_keys_under_prefix() {
        assert_eq!(storage("einvoice-watch").key("posts.json"), "einvoice-watch/posts.json");
        assert_eq!(storage("watch/").key("posts.json"), "watch/posts.json");
        assert_eq!(storage("").key("posts.json"), "posts.json");
        assert_eq!(
            PostStore::describe(&storage("w")),
            "s3://bucket/w/posts.json"
        );
    }
}
