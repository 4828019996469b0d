//! Crawl pipeline stages and their drivers.
//!
//! - `detect`: cache-metadata pre-filter choosing URLs to fetch
//! - `merge`: deduplicating merge of candidate items into posts
//! - `orchestrator`: full and incremental runs
//! - `scheduler`: periodic triggering of runs

pub mod detect;
pub mod merge;
pub mod orchestrator;
pub mod scheduler;

pub use detect::{RescrapeSelection, select_for_rescrape, select_for_rescrape_at};
pub use merge::{GRACE_WINDOW_HOURS, MergeResult, MergeStats, age_statuses, merge, merge_at};
pub use orchestrator::ScrapeOrchestrator;
pub use scheduler::Scheduler;
