// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains all data structures shared between the crawl
//! services, the pipeline and the stores.

mod config;
mod page;
mod post;
mod stats;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, MatcherConfig, ModeConfig, NotifyConfig, ScheduleConfig,
    StorageConfig,
};
pub use page::{CacheMap, CachedPage, PageMeta};
pub use post::{ContentItem, Post, PostStatus};
pub use stats::{CrawlMode, RunOutcome, RunStats};
