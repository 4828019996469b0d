// src/pipeline/scheduler.rs

//! Periodic triggering of crawl runs.
//!
//! The orchestrator knows nothing about wall-clock time; this component
//! calls its entry points on fixed intervals until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};

use crate::models::{CrawlMode, RunOutcome, ScheduleConfig};
use crate::pipeline::orchestrator::ScrapeOrchestrator;

/// Drives incremental runs and optional full runs on intervals.
pub struct Scheduler {
    orchestrator: Arc<ScrapeOrchestrator>,
    incremental_every: Duration,
    full_every: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<ScrapeOrchestrator>,
        incremental_every: Duration,
        full_every: Option<Duration>,
    ) -> Self {
        Self {
            orchestrator,
            incremental_every,
            full_every,
        }
    }

    pub fn from_config(orchestrator: Arc<ScrapeOrchestrator>, config: &ScheduleConfig) -> Self {
        Self::new(
            orchestrator,
            config.incremental_period(),
            config.full_period(),
        )
    }

    /// Run until `shutdown` resolves. Returns the number of completed runs.
    ///
    /// The first incremental run starts immediately; the first full run
    /// waits one full period. A run in progress is finished before the
    /// shutdown signal is observed.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut incremental = interval(self.incremental_every);
        incremental.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut full = self.full_every.map(|period| {
            let mut full = interval_at(Instant::now() + period, period);
            full.set_missed_tick_behavior(MissedTickBehavior::Delay);
            full
        });

        log::info!(
            "Scheduler started: incremental every {}s, full {}",
            self.incremental_every.as_secs(),
            self.full_every
                .map(|p| format!("every {}s", p.as_secs()))
                .unwrap_or_else(|| "disabled".to_string())
        );

        tokio::pin!(shutdown);
        let mut completed = 0;
        loop {
            let mode = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = incremental.tick() => CrawlMode::Incremental,
                _ = tick_optional(&mut full) => CrawlMode::Full,
            };
            match self.orchestrator.run(mode).await {
                RunOutcome::Completed(_) => completed += 1,
                RunOutcome::AlreadyRunning => log::warn!("Scheduled {} crawl skipped", mode),
            }
        }

        log::info!("Scheduler stopped after {} runs", completed);
        completed
    }
}

/// Tick an interval that may be disabled; a disabled one never fires.
async fn tick_optional(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::services::{ContentMatcher, HtmlPageParser};
    use crate::storage::{MemoryStorage, Stores};
    use crate::testing::StaticFetcher;

    fn orchestrator() -> Arc<ScrapeOrchestrator> {
        let mut config = Config::default();
        config.crawler.start_url = "https://example.gov/".to_string();
        config.crawler.request_delay_ms = 0;
        let matcher = ContentMatcher::new(&config.matcher).unwrap();
        Arc::new(ScrapeOrchestrator::new(
            config,
            Arc::new(StaticFetcher::new().page("https://example.gov/", "<h1>Home</h1>")),
            Arc::new(HtmlPageParser::new().unwrap()),
            matcher,
            Stores::single(MemoryStorage::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_intervals_until_shutdown() {
        let scheduler = Scheduler::new(
            orchestrator(),
            Duration::from_secs(10 * 60),
            Some(Duration::from_secs(60 * 60)),
        );

        let runs = scheduler
            .run_until(tokio::time::sleep(Duration::from_secs(65 * 60)))
            .await;

        // Incremental at 0, 10, ..., 60 minutes plus one full run at 60.
        assert_eq!(runs, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_runs_disabled() {
        let scheduler = Scheduler::from_config(
            orchestrator(),
            &ScheduleConfig {
                incremental_every_mins: 30,
                full_every_hours: 0,
            },
        );

        let runs = scheduler
            .run_until(tokio::time::sleep(Duration::from_secs(45 * 60)))
            .await;

        assert_eq!(runs, 2);
    }

    #[tokio::test]
    async fn test_immediate_shutdown() {
        let scheduler = Scheduler::new(orchestrator(), Duration::from_secs(60), None);
        assert_eq!(scheduler.run_until(async {}).await, 0);
    }
}
