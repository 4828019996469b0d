// src/pipeline/orchestrator.rs

//! Crawl run orchestration.
//!
//! One run is a linear pipeline:
//!
//! 1. Load the page cache and the stored posts
//! 2. Crawl the site to enumerate URLs
//! 3. Select URLs to fetch from cache metadata
//! 4. Fetch, match and extract each selected URL, updating the cache
//! 5. Merge candidate items into the posts
//! 6. Persist posts, then the cache
//!
//! Backend failures degrade the run instead of aborting it. The cache is
//! only persisted after the posts it vouches for have been stored, so a
//! skipped page never hides an item that was lost.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{
    CacheMap, Config, ContentItem, CrawlMode, PageMeta, Post, RunOutcome, RunStats,
};
use crate::pipeline::detect::{RescrapeSelection, select_for_rescrape};
use crate::pipeline::merge::merge_at;
use crate::services::{
    ContentMatcher, HtmlPageParser, HttpOracle, LogNotifier, MultiNotifier, Notifier,
    PageFetcher, PageParser, RateLimitedOracle, SiteCrawler, WebhookNotifier, create_fetcher,
};
use crate::storage::{PageCache, Stores};
use crate::utils::http::create_async_client;
use crate::utils::progress;

const TOTAL_STEPS: usize = 6;

/// Mutable state owned by one run.
struct RunState {
    cache: PageCache,
    posts: Vec<Post>,
    posts_loaded: bool,
    candidates: Vec<ContentItem>,
    new_posts: Vec<Post>,
    stats: RunStats,
}

impl RunState {
    /// Merge pending candidates into the post set and age statuses.
    fn merge_candidates(&mut self) {
        let result = merge_at(
            std::mem::take(&mut self.posts),
            std::mem::take(&mut self.candidates),
            Utc::now(),
        );
        self.posts = result.merged_posts;
        self.new_posts.extend(result.new_posts);
    }
}

/// Runs full and incremental crawls against one pair of stores.
pub struct ScrapeOrchestrator {
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn PageParser>,
    matcher: ContentMatcher,
    crawler: SiteCrawler,
    stores: Stores,
    notifier: Option<Arc<dyn Notifier>>,
    run_lock: Mutex<()>,
}

impl ScrapeOrchestrator {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn PageParser>,
        matcher: ContentMatcher,
        stores: Stores,
    ) -> Self {
        let crawler = SiteCrawler::new(
            fetcher.clone(),
            parser.clone(),
            Duration::from_millis(config.crawler.request_delay_ms),
        );
        Self {
            config,
            fetcher,
            parser,
            matcher,
            crawler,
            stores,
            notifier: None,
            run_lock: Mutex::new(()),
        }
    }

    /// Inform `notifier` after every completed run.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Wire the HTTP fetcher, HTML parser, matcher, oracle and notifiers
    /// described by `config`.
    pub fn from_config(config: Config, stores: Stores) -> Result<Self> {
        let fetcher = create_fetcher(&config.crawler)?;
        let parser: Arc<dyn PageParser> = Arc::new(HtmlPageParser::new()?);

        let mut matcher = ContentMatcher::new(&config.matcher)?;
        if let Some(oracle_url) = &config.matcher.oracle_url {
            let oracle = HttpOracle::with_timeout(
                oracle_url,
                Duration::from_secs(config.matcher.oracle_timeout_secs),
            )?;
            matcher = matcher.with_oracle(Arc::new(RateLimitedOracle::new(
                oracle,
                Duration::from_millis(config.matcher.oracle_interval_ms),
            )));
            log::info!("Relevance oracle: {}", oracle_url);
        }

        let mut channels: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        if let Some(webhook_url) = &config.notify.webhook_url {
            let client = create_async_client(&config.crawler)?;
            channels.push(Arc::new(WebhookNotifier::new(client, webhook_url.clone())));
        }

        Ok(Self::new(config, fetcher, parser, matcher, stores)
            .with_notifier(Arc::new(MultiNotifier::new(channels))))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn matcher(&self) -> &ContentMatcher {
        &self.matcher
    }

    pub async fn run_full_crawl(&self) -> RunOutcome {
        self.run(CrawlMode::Full).await
    }

    pub async fn run_incremental_crawl(&self) -> RunOutcome {
        self.run(CrawlMode::Incremental).await
    }

    /// Execute one run, or do nothing while another run is in flight.
    pub async fn run(&self, mode: CrawlMode) -> RunOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            log::warn!("A crawl is already running; {} crawl request ignored", mode);
            return RunOutcome::AlreadyRunning;
        };
        RunOutcome::Completed(self.execute(mode).await)
    }

    async fn execute(&self, mode: CrawlMode) -> RunStats {
        let mode_config = self.config.mode(mode);
        progress::header(&format!("E-invoicing watch: {} crawl", mode));

        progress::step(1, TOTAL_STEPS, "Loading page cache and posts");
        let mut state = self.load_state(mode).await;

        progress::step(2, TOTAL_STEPS, "Crawling site");
        let report = self
            .crawler
            .crawl(&self.config.crawler.start_url, mode_config.max_depth)
            .await;
        state.stats.pages_discovered = report.urls.len();
        state.stats.crawl_failures = report.failures;

        progress::step(3, TOTAL_STEPS, "Selecting pages to fetch");
        let selection = select_for_rescrape(state.cache.as_map(), &report.urls, mode_config.max_age_days);
        state.stats.pages_skipped = selection.to_skip.len();
        state.stats.cache_hit_rate = selection.hit_rate();
        let (to_fetch, deferred) = apply_fetch_cap(state.cache.as_map(), selection, mode_config.max_fetch);
        state.stats.pages_deferred = deferred;
        if deferred > 0 {
            log::info!("Fetch cap reached: {} pages deferred to a later run", deferred);
        }

        progress::step(4, TOTAL_STEPS, &format!("Fetching {} pages", to_fetch.len()));
        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        let checkpoint_every = mode_config.checkpoint_every;
        for (i, url) in to_fetch.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.process_page(url, &mut state).await;

            let done = i + 1;
            if checkpoint_every > 0 && done % checkpoint_every == 0 && done < to_fetch.len() {
                log::info!("Checkpoint after {}/{} pages", done, to_fetch.len());
                state.merge_candidates();
                self.persist(&state).await;
            }
        }

        progress::step(5, TOTAL_STEPS, "Merging posts");
        let existing = state.posts.len() - state.new_posts.len();
        state.merge_candidates();
        state.stats.new_posts = state.new_posts.len();
        state.stats.total_posts = state.posts.len();
        log::info!(
            "{} new posts, {} existing, {} total",
            state.stats.new_posts,
            existing,
            state.stats.total_posts
        );

        progress::step(6, TOTAL_STEPS, "Persisting");
        let (posts_persisted, cache_persisted) = self.persist(&state).await;
        state.stats.posts_persisted = posts_persisted;
        state.stats.cache_persisted = cache_persisted;
        state.stats.end_time = Utc::now();

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&state.new_posts, &state.stats).await {
                log::warn!("Notification failed: {}", e);
            }
        }

        log_summary(&state.stats);
        state.stats
    }

    async fn load_state(&self, mode: CrawlMode) -> RunState {
        let cache = match self.stores.cache.load_all().await {
            Ok(map) => {
                log::info!("Loaded {} cache entries", map.len());
                map
            }
            Err(e) => {
                log::warn!("Page cache unavailable, starting empty: {}", e);
                CacheMap::new()
            }
        };
        let (posts, posts_loaded) = match self.stores.posts.load_all().await {
            Ok(posts) => {
                log::info!("Loaded {} posts", posts.len());
                (posts, true)
            }
            Err(e) => {
                log::warn!("Post store unavailable, results will not be saved: {}", e);
                (Vec::new(), false)
            }
        };

        RunState {
            cache: PageCache::from_map(cache),
            posts,
            posts_loaded,
            candidates: Vec::new(),
            new_posts: Vec::new(),
            stats: RunStats::new(mode, Utc::now()),
        }
    }

    /// Fetch one URL and record the outcome in the cache.
    async fn process_page(&self, url: &str, state: &mut RunState) {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                state.stats.fetch_failures += 1;
                log::warn!("Fetch failed for {}: {}", url, e);
                return;
            }
        };
        state.stats.pages_fetched += 1;
        let now = Utc::now();

        if state.cache.get(url).is_some() && !state.cache.has_changed(url, &page.body) {
            state.cache.touch(url, page.status, now);
            state.stats.pages_unchanged += 1;
            log::debug!("Unchanged: {}", url);
            return;
        }

        let (title, items) = if page.is_markup() {
            self.extract_verified(url, &page.body).await
        } else {
            (String::new(), Vec::new())
        };

        let is_relevant = !items.is_empty();
        if is_relevant {
            state.stats.pages_relevant += 1;
            log::info!("Relevant: {} ({} items)", url, items.len());
        }
        state.cache.update_at(
            url,
            &page.body,
            PageMeta {
                title,
                is_relevant,
                relevant_item_count: items.len(),
                http_status: page.status,
            },
            now,
        );
        state.stats.candidates_found += items.len();
        state.candidates.extend(items);
    }

    /// Page title and the candidate items that pass verification.
    async fn extract_verified(&self, url: &str, body: &str) -> (String, Vec<ContentItem>) {
        let text = self.parser.extract_text(body);
        if !self.matcher.is_relevant(&text.combined()) {
            return (text.title, Vec::new());
        }

        let mut verified = Vec::new();
        for item in self.parser.extract_candidate_items(body, url) {
            if self.matcher.verify(&item.title, &item.text_excerpt).await {
                verified.push(item);
            } else {
                log::debug!("Rejected by verification: {}", item.url);
            }
        }
        (text.title, verified)
    }

    /// Store posts, then the cache. Returns `(posts_persisted, cache_persisted)`.
    async fn persist(&self, state: &RunState) -> (bool, bool) {
        if !state.posts_loaded {
            log::warn!("Skipping persistence: existing posts could not be loaded");
            return (false, false);
        }
        if let Err(e) = self.stores.posts.upsert_all(&state.posts).await {
            log::warn!("Saving posts failed, keeping page cache unchanged: {}", e);
            return (false, false);
        }
        match self.stores.cache.save_all(state.cache.as_map()).await {
            Ok(()) => (true, true),
            Err(e) => {
                log::warn!("Saving page cache failed: {}", e);
                (true, false)
            }
        }
    }
}

/// Apply the per-run fetch cap. Returns the URLs to fetch and the deferred count.
///
/// Unseen URLs go before stale ones so new content surfaces first.
fn apply_fetch_cap(
    cache: &CacheMap,
    selection: RescrapeSelection,
    max_fetch: Option<usize>,
) -> (Vec<String>, usize) {
    let mut to_fetch = selection.to_fetch;
    let Some(max) = max_fetch else {
        return (to_fetch, 0);
    };
    if to_fetch.len() <= max {
        return (to_fetch, 0);
    }
    to_fetch.sort_by_key(|url| cache.contains_key(url));
    let deferred = to_fetch.split_off(max);
    (to_fetch, deferred.len())
}

fn log_summary(stats: &RunStats) {
    progress::summary(&format!("{} crawl complete", stats.mode), &stats.summary_rows());
    if !stats.posts_persisted || !stats.cache_persisted {
        log::warn!(
            "Durability degraded this run (posts saved: {}, cache saved: {})",
            stats.posts_persisted,
            stats.cache_persisted
        );
    }
}
