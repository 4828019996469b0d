// src/services/notifier.rs

//! Post-run notification channels.
//!
//! Notification is fire-and-forget from the run's point of view: the
//! orchestrator logs a failed delivery and moves on.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Post, RunStats};

/// Receives the outcome of a completed run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, new_posts: &[Post], stats: &RunStats) -> Result<()>;
}

/// Writes new posts to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, new_posts: &[Post], stats: &RunStats) -> Result<()> {
        if new_posts.is_empty() {
            log::info!("No new posts found in {} crawl", stats.mode);
            return Ok(());
        }
        log::info!("{} new post(s) found in {} crawl:", new_posts.len(), stats.mode);
        for post in new_posts {
            log::info!("{}", post.format("    {title} ({published}) {url}"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    mode: String,
    new_count: usize,
    total_posts: usize,
    posts: &'a [Post],
}

/// POSTs a JSON summary to a webhook when a run found new posts.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, new_posts: &[Post], stats: &RunStats) -> Result<()> {
        if new_posts.is_empty() {
            return Ok(());
        }
        let payload = WebhookPayload {
            mode: stats.mode.to_string(),
            new_count: new_posts.len(),
            total_posts: stats.total_posts,
            posts: new_posts,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AppError::crawl(
                "webhook",
                format!("HTTP {}", response.status().as_u16()),
            ));
        }
        Ok(())
    }
}

/// Fans a notification out to several channels.
pub struct MultiNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify(&self, new_posts: &[Post], stats: &RunStats) -> Result<()> {
        let results = join_all(
            self.channels
                .iter()
                .map(|channel| channel.notify(new_posts, stats)),
        )
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::crawl("notify", failures.join("; ")))
        }
    }
}
