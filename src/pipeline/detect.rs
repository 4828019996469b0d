// src/pipeline/detect.rs

//! Metadata-only pre-filter deciding which discovered URLs to refetch.

use chrono::{DateTime, Utc};

use crate::models::CacheMap;

/// Partition of discovered URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescrapeSelection {
    /// Unseen or stale URLs, in discovery order
    pub to_fetch: Vec<String>,
    /// URLs with a fresh cache entry
    pub to_skip: Vec<String>,
}

impl RescrapeSelection {
    pub fn total(&self) -> usize {
        self.to_fetch.len() + self.to_skip.len()
    }

    /// Share of URLs skipped; 0.0 when nothing was discovered.
    pub fn hit_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.to_skip.len() as f64 / total as f64,
        }
    }
}

/// Select URLs to fetch now.
pub fn select_for_rescrape(
    cache: &CacheMap,
    discovered: &[String],
    max_age_days: u32,
) -> RescrapeSelection {
    select_for_rescrape_at(cache, discovered, max_age_days, Utc::now())
}

/// [`select_for_rescrape`] against an explicit clock.
///
/// Unseen URLs and entries older than `max_age_days` are fetched; the rest
/// are skipped. Content is never inspected here.
pub fn select_for_rescrape_at(
    cache: &CacheMap,
    discovered: &[String],
    max_age_days: u32,
    now: DateTime<Utc>,
) -> RescrapeSelection {
    let max_age = chrono::Duration::days(i64::from(max_age_days));
    let mut selection = RescrapeSelection::default();

    for url in discovered {
        let fetch = cache
            .get(url)
            .is_none_or(|entry| entry.is_stale(now, max_age));
        if fetch {
            selection.to_fetch.push(url.clone());
        } else {
            selection.to_skip.push(url.clone());
        }
    }

    log::info!(
        "Change detection: {} to fetch, {} skipped ({:.1}% hit rate)",
        selection.to_fetch.len(),
        selection.to_skip.len(),
        selection.hit_rate() * 100.0
    );
    selection
}
