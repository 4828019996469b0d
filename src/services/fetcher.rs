// src/services/fetcher.rs

//! Page retrieval.
//!
//! All content reaches the watcher through [`PageFetcher`]. Two HTTP
//! implementations exist: a direct client and a client for the scrape proxy
//! (`GET {proxy}/api/scrape?url=...`) used where the target site refuses
//! direct requests.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::http::create_async_client;
use crate::utils::url::service_endpoint;

/// A successfully retrieved page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    /// Whether the body is markup worth parsing for links and items.
    pub fn is_markup(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.is_empty() || ct.contains("html") || ct.contains("xml")
    }
}

/// Source of page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one URL. A missing page (404) is a success with an empty body.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Fetches pages directly from the target site.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if status == StatusCode::NOT_FOUND {
            log::debug!("Page not found (404): {}", url);
            return Ok(FetchedPage {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                body: String::new(),
            });
        }
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| AppError::fetch(url, e))?;
        Ok(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Body returned by the scrape proxy.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    success: bool,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ProxyResponse {
    fn into_page(self, url: &str) -> Result<FetchedPage> {
        if !self.success {
            let message = self.error.unwrap_or_else(|| "proxy reported failure".into());
            return Err(AppError::fetch(url, message));
        }
        Ok(FetchedPage {
            url: url.to_string(),
            status: self.status.unwrap_or(200),
            content_type: self.content_type.unwrap_or_default(),
            body: self.html.unwrap_or_default(),
        })
    }
}

/// Fetches pages through the scrape proxy.
pub struct ProxyFetcher {
    client: Client,
    endpoint: Url,
}

impl ProxyFetcher {
    pub fn new(client: Client, proxy_base: &str) -> Result<Self> {
        let endpoint = service_endpoint(proxy_base, "api/scrape")?;
        Ok(Self { client, endpoint })
    }

    fn request_url(&self, url: &str) -> Url {
        let mut endpoint = self.endpoint.clone();
        endpoint.query_pairs_mut().append_pair("url", url);
        endpoint
    }
}

#[async_trait]
impl PageFetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(self.request_url(url))
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        // The proxy answers failures with a 500 and a JSON body.
        let body: ProxyResponse = response
            .json()
            .await
            .map_err(|e| AppError::fetch(url, format!("bad proxy response: {e}")))?;
        body.into_page(url)
    }
}

/// Build the fetcher selected by the crawler configuration.
pub fn create_fetcher(config: &CrawlerConfig) -> Result<Arc<dyn PageFetcher>> {
    let client = create_async_client(config)?;
    match &config.proxy_url {
        Some(proxy) => {
            log::info!("Fetching pages through proxy {}", proxy);
            Ok(Arc::new(ProxyFetcher::new(client, proxy)?))
        }
        None => Ok(Arc::new(HttpFetcher::new(client))),
    }
}
