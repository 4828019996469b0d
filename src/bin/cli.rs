//! E-invoicing Watch CLI
//!
//! Local execution entry point. For AWS Lambda, use `einvoice-watch-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use einvoice_watch::{
    error::Result,
    models::{Config, CrawlMode, PostStatus, RunOutcome},
    pipeline::{ScrapeOrchestrator, Scheduler},
    services::ContentMatcher,
    storage::{Stores, build_stores},
};

/// E-invoicing Watch - government site publication tracker
#[derive(Parser, Debug)]
#[command(
    name = "einvoice-watch",
    version,
    about = "Tracks e-invoicing publications with an incremental crawl cache"
)]
struct Cli {
    /// Directory holding config.toml and the local stores
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deep crawl with a long cache window
    Full,

    /// Shallow crawl with a short cache window and a fetch cap
    Incremental,

    /// Run crawls on the configured schedule until Ctrl-C
    Watch,

    /// List stored posts
    Posts {
        /// Only posts still marked new
        #[arg(long)]
        new: bool,
    },

    /// Show page cache summary
    Cache,

    /// Drop the page cache so the next run refetches everything
    ClearCache,

    /// Delete all stored posts
    ClearPosts,

    /// Classify a piece of text with the content matcher
    Check {
        /// Text to classify
        text: String,

        /// Title verified together with the text
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Validate configuration file
    Validate,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");

    if let Command::Init { force } = cli.command {
        if config_path.exists() && !force {
            log::warn!(
                "{} already exists. Use --force to overwrite.",
                config_path.display()
            );
            return Ok(());
        }
        let mut config = Config::default();
        config.storage.dir = cli.storage_dir.display().to_string();
        config.save(&config_path)?;
        log::info!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let mut config = Config::load_or_default(&config_path);
    config.storage.dir = cli.storage_dir.display().to_string();
    log::info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Command::Full => run_once(config, CrawlMode::Full).await?,
        Command::Incremental => run_once(config, CrawlMode::Incremental).await?,

        Command::Watch => {
            config.validate()?;
            let stores = build_stores(&config).await?;
            let schedule = config.schedule.clone();
            let orchestrator = Arc::new(ScrapeOrchestrator::from_config(config, stores)?);
            let scheduler = Scheduler::from_config(orchestrator, &schedule);

            let runs = scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                    log::info!("Shutdown requested");
                })
                .await;
            log::info!("Completed {} scheduled runs", runs);
        }

        Command::Posts { new } => {
            let Stores { posts, .. } = build_stores(&config).await?;
            let mut posts = posts.load_all().await?;
            posts.retain(|p| !new || p.status == PostStatus::New);
            posts.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));

            for post in &posts {
                println!("{}", post.format("[{status}] {published}  {title}\n    {url}"));
            }
            log::info!("{} posts", posts.len());
        }

        Command::Cache => {
            let Stores { cache, .. } = build_stores(&config).await?;
            let map = cache.load_all().await?;
            log::info!("Page cache: {}", cache.describe());
            log::info!("Entries: {}", map.len());
            log::info!(
                "Relevant pages: {}",
                map.values().filter(|p| p.is_relevant).count()
            );
            if let Some(oldest) = map.values().map(|p| p.last_crawled_at).min() {
                log::info!("Oldest crawl: {}", oldest.to_rfc3339());
            }
            if let Some(newest) = map.values().map(|p| p.last_crawled_at).max() {
                log::info!("Newest crawl: {}", newest.to_rfc3339());
            }
        }

        Command::ClearCache => {
            let Stores { cache, .. } = build_stores(&config).await?;
            cache.clear().await?;
            log::info!("Cleared page cache at {}", cache.describe());
        }

        Command::ClearPosts => {
            let Stores { posts, .. } = build_stores(&config).await?;
            posts.delete_all().await?;
            log::info!("Deleted all posts at {}", posts.describe());
        }

        Command::Check { text, title } => {
            let stores = Stores::single(einvoice_watch::storage::MemoryStorage::new());
            let orchestrator = ScrapeOrchestrator::from_config(config, stores)?;
            check_text(orchestrator.matcher(), &title, &text).await;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            ContentMatcher::new(&config.matcher)?;
            log::info!("✓ Config OK");
        }

        Command::Init { .. } => {}
    }

    Ok(())
}

/// Execute one crawl run and report its outcome.
async fn run_once(config: Config, mode: CrawlMode) -> Result<()> {
    config.validate()?;
    let stores = build_stores(&config).await?;
    let orchestrator = ScrapeOrchestrator::from_config(config, stores)?;

    match orchestrator.run(mode).await {
        RunOutcome::Completed(stats) => {
            if stats.new_posts == 0 {
                log::info!("No new posts found, see log for details");
            }
        }
        RunOutcome::AlreadyRunning => log::warn!("Another crawl is running"),
    }
    Ok(())
}

async fn check_text(matcher: &ContentMatcher, title: &str, text: &str) {
    let combined = format!("{title} {text}");
    let relevant = matcher.is_relevant(&combined);
    log::info!("Keyword match: {}", relevant);
    log::info!(
        "Strong indicators: {}",
        matcher.strong_indicator_count(&combined)
    );

    if relevant {
        let verification = matcher.verify_detailed(title, text).await;
        log::info!(
            "Verified: {} (via {})",
            verification.verified,
            verification.method.as_str()
        );
    }
}
