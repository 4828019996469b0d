//! Service layer for the watcher.
//!
//! This module contains the collaborators a crawl run is built from:
//! - Page retrieval (`PageFetcher`, `HttpFetcher`, `ProxyFetcher`)
//! - Markup extraction (`PageParser`, `HtmlPageParser`)
//! - Relevance classification (`ContentMatcher`, `RelevanceOracle`)
//! - Site traversal (`SiteCrawler`)
//! - Run notification (`Notifier`)

pub mod crawler;
pub mod fetcher;
pub mod matcher;
pub mod notifier;
pub mod oracle;
pub mod parser;

pub use crawler::{CrawlReport, SiteCrawler};
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher, ProxyFetcher, create_fetcher};
pub use matcher::{ContentMatcher, Verification, VerificationMethod};
pub use notifier::{LogNotifier, MultiNotifier, Notifier, WebhookNotifier};
pub use oracle::{HttpOracle, RateLimitedOracle, RelevanceOracle};
pub use parser::{HtmlPageParser, PageParser, PageText};
