//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{CrawlMode, RunStats};
use crate::services::fetcher::{FetchedPage, PageFetcher};

/// Serves canned pages and records every requested URL.
#[derive(Clone, Default)]
pub struct StaticFetcher {
    pages: Arc<Mutex<HashMap<String, (u16, String)>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with status 200 at `url`.
    pub fn page(self, url: &str, html: &str) -> Self {
        self.set_page(url, 200, html);
        self
    }

    /// Replace the content served at `url`.
    pub fn set_page(&self, url: &str, status: u16, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, html.to_string()));
    }

    /// Every URL fetched so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requested.lock().unwrap().clear();
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.requested.lock().unwrap().push(url.to_string());
        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some((status, body)) => Ok(FetchedPage {
                url: url.to_string(),
                status,
                content_type: "text/html; charset=utf-8".to_string(),
                body,
            }),
            None => Err(AppError::fetch(url, "connection reset")),
        }
    }
}

/// Zeroed statistics for notifier tests.
pub fn empty_stats(mode: CrawlMode) -> RunStats {
    RunStats::new(mode, Utc::now())
}
