// src/services/crawler.rs

//! Breadth-first traversal of the site's internal link graph.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::services::fetcher::PageFetcher;
use crate::services::parser::PageParser;
use crate::utils::url::normalize;

/// URLs visited by one traversal.
#[derive(Debug, Default, Clone)]
pub struct CrawlReport {
    /// Every visited URL in visit order
    pub urls: Vec<String>,
    /// Visits whose fetch failed
    pub failures: usize,
}

/// Enumerates same-site pages up to a link depth.
pub struct SiteCrawler {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn PageParser>,
    delay: Duration,
}

impl SiteCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, parser: Arc<dyn PageParser>, delay: Duration) -> Self {
        Self {
            fetcher,
            parser,
            delay,
        }
    }

    /// Visit `start_url` and everything reachable within `max_depth` links.
    ///
    /// Fetches are sequential with the politeness delay in between. A page
    /// that fails to fetch is still reported as visited but yields no links.
    pub async fn crawl(&self, start_url: &str, max_depth: usize) -> CrawlReport {
        let mut report = CrawlReport::default();
        let Some(start) = normalize(start_url) else {
            log::warn!("Invalid start URL: {}", start_url);
            return report;
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut queued: HashSet<String> = HashSet::from([start.clone()]);
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(start, 0)]);
        let mut first_request = true;

        while let Some((url, depth)) = frontier.pop_front() {
            if visited.contains(&url) || depth > max_depth {
                continue;
            }
            visited.insert(url.clone());
            report.urls.push(url.clone());

            if !first_request && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            first_request = false;

            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    report.failures += 1;
                    log::warn!("Crawl fetch failed for {}: {}", url, e);
                    continue;
                }
            };
            if !page.is_markup() || depth == max_depth {
                continue;
            }

            let links = self.parser.extract_links(&page.body, &url);
            log::debug!("{} (depth {}): {} links", url, depth, links.len());
            for link in links {
                if !visited.contains(&link) && queued.insert(link.clone()) {
                    frontier.push_back((link, depth + 1));
                }
            }
        }

        log::info!(
            "Crawl visited {} pages ({} failures, max depth {})",
            report.urls.len(),
            report.failures,
            max_depth
        );
        report
    }
}
