//! AWS Lambda entry point for E-invoicing Watch
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//! Schedule with EventBridge using `{"mode": "incremental"}` or
//! `{"mode": "full"}` as the payload.

use std::sync::Arc;

use einvoice_watch::{
    models::{Config, CrawlMode, RunOutcome},
    pipeline::ScrapeOrchestrator,
    storage::{FallbackStore, LocalStorage, S3Storage, Stores},
};
use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Local fallback directory; the only writable path in Lambda.
const FALLBACK_DIR: &str = "/tmp/einvoice-watch";

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default = "default_mode")]
    mode: CrawlMode,
}

fn default_mode() -> CrawlMode {
    CrawlMode::Incremental
}

/// Orchestrator shared by warm invocations.
static ORCHESTRATOR: OnceCell<Arc<ScrapeOrchestrator>> = OnceCell::const_new();

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("E-invoicing Watch Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}

/// Build configuration from the environment.
fn load_config() -> Config {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::load_or_default(path),
        Err(_) => Config::default(),
    };
    if let Ok(bucket) = std::env::var("S3_BUCKET") {
        config.storage.s3_bucket = Some(bucket);
    }
    if let Ok(prefix) = std::env::var("S3_PREFIX") {
        config.storage.s3_prefix = prefix;
    }
    if let Ok(url) = std::env::var("ORACLE_URL") {
        config.matcher.oracle_url = Some(url);
    }
    config.storage.dir = FALLBACK_DIR.to_string();
    config
}

async fn orchestrator() -> Result<Arc<ScrapeOrchestrator>, LambdaError> {
    let orchestrator = ORCHESTRATOR
        .get_or_try_init(|| async {
            let config = load_config();
            config.validate()?;

            let local = LocalStorage::with_batch_size(FALLBACK_DIR, config.storage.batch_size);
            let stores = match &config.storage.s3_bucket {
                Some(bucket) => {
                    let s3 = S3Storage::from_env(bucket, &config.storage.s3_prefix)
                        .await
                        .with_batch_size(config.storage.batch_size);
                    Stores::single(FallbackStore::new(s3, local))
                }
                None => Stores::single(local),
            };
            ScrapeOrchestrator::from_config(config, stores).map(Arc::new)
        })
        .await?;
    Ok(Arc::clone(orchestrator))
}

/// Handler for AWS Lambda events.
async fn handler(event: LambdaEvent<Value>) -> Result<Value, LambdaError> {
    info!("Received event: {:?}", event.payload);

    let mode = serde_json::from_value::<Payload>(event.payload)
        .map(|p| p.mode)
        .unwrap_or_else(|e| {
            error!("Invalid payload, running incremental crawl: {}", e);
            CrawlMode::Incremental
        });

    let orchestrator = orchestrator().await?;
    match orchestrator.run(mode).await {
        RunOutcome::Completed(stats) => {
            info!(
                "Lambda execution successful: {} new posts, {} total",
                stats.new_posts, stats.total_posts
            );
            Ok(json!({
                "status": "success",
                "stats": stats,
            }))
        }
        RunOutcome::AlreadyRunning => Ok(json!({
            "status": "skipped",
            "message": "a crawl is already running",
        })),
    }
}
