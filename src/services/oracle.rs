// src/services/oracle.rs

//! External relevance verification.
//!
//! The oracle is a shared, rate-limited service (an LLM behind the
//! `/api/verify-llm` endpoint). Callers go through [`RateLimitedOracle`] so
//! at most one request is in flight and consecutive requests are spaced by
//! a minimum interval.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::{AppError, Result};
use crate::utils::url::service_endpoint;

/// Characters of excerpt sent along with the title.
const ORACLE_EXCERPT_CHARS: usize = 800;

/// Answers whether an item is about e-invoicing.
#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    async fn verify(&self, title: &str, excerpt: &str) -> Result<bool>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    title: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Oracle reached over HTTP.
pub struct HttpOracle {
    client: Client,
    endpoint: Url,
}

impl HttpOracle {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let endpoint = service_endpoint(base_url, "api/verify-llm")?;
        Ok(Self { client, endpoint })
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::new(client, base_url)
    }
}

#[async_trait]
impl RelevanceOracle for HttpOracle {
    async fn verify(&self, title: &str, excerpt: &str) -> Result<bool> {
        let request = VerifyRequest {
            title,
            content: excerpt.chars().take(ORACLE_EXCERPT_CHARS).collect(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(AppError::oracle)?;

        let body: VerifyResponse = response.json().await.map_err(AppError::oracle)?;
        parse_verdict(body)
    }
}

fn parse_verdict(body: VerifyResponse) -> Result<bool> {
    if !body.success {
        return Err(AppError::oracle(
            body.error.unwrap_or_else(|| "verification failed".into()),
        ));
    }
    log::debug!(
        "Oracle verdict {} via {}",
        body.verified,
        body.method.as_deref().unwrap_or("unknown")
    );
    Ok(body.verified)
}

/// Serializes calls to an inner oracle and spaces them by `interval`.
pub struct RateLimitedOracle<O> {
    inner: O,
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<O: RelevanceOracle> RateLimitedOracle<O> {
    pub fn new(inner: O, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_call: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<O: RelevanceOracle> RelevanceOracle for RateLimitedOracle<O> {
    async fn verify(&self, title: &str, excerpt: &str) -> Result<bool> {
        // Held across the call: concurrent callers queue here.
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
        self.inner.verify(title, excerpt).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingOracle {
        calls: StdMutex<Vec<Instant>>,
    }

    #[async_trait]
    impl RelevanceOracle for RecordingOracle {
        async fn verify(&self, _title: &str, _excerpt: &str) -> Result<bool> {
            self.calls.lock().unwrap().push(Instant::now());
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced_by_interval() {
        let oracle = RateLimitedOracle::new(RecordingOracle::default(), Duration::from_millis(500));

        for _ in 0..3 {
            assert!(oracle.verify("t", "e").await.unwrap());
        }

        let calls = oracle.inner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls[1] - calls[0] >= Duration::from_millis(500));
        assert!(calls[2] - calls[1] >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_serialize() {
        let oracle = Arc::new(RateLimitedOracle::new(
            RecordingOracle::default(),
            Duration::from_millis(500),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                tokio::spawn(async move { oracle.verify("t", "e").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut calls = oracle.inner.calls.lock().unwrap().clone();
        calls.sort();
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let oracle = RateLimitedOracle::new(RecordingOracle::default(), Duration::from_secs(5));
        let start = Instant::now();
        oracle.verify("t", "e").await.unwrap();
        assert!(Instant::now() - start < Duration::from_secs(5));
    }

    #[test]
    fn test_parse_verdict() {
        let ok: VerifyResponse = serde_json::from_str(
            r#"{"success":true,"verified":true,"response":"YES","method":"huggingface"}"#,
        )
        .unwrap();
        assert!(parse_verdict(ok).unwrap());

        let failed: VerifyResponse =
            serde_json::from_str(r#"{"success":false,"error":"Title or content is required"}"#)
                .unwrap();
        assert!(matches!(parse_verdict(failed), Err(AppError::Oracle(_))));
    }

    #[test]
    fn test_endpoint_path() {
        let oracle = HttpOracle::new(Client::new(), "http://localhost:3002").unwrap();
        assert_eq!(oracle.endpoint.as_str(), "http://localhost:3002/api/verify-llm");

        let oracle = HttpOracle::new(Client::new(), "https://tools.example.gov/watch").unwrap();
        assert_eq!(oracle.endpoint.as_str(), "https://tools.example.gov/watch/api/verify-llm");
    }
}
