// src/pipeline/merge.rs

//! Merge of candidate items into the post set.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{ContentItem, Post, PostStatus};

/// Hours a post stays `New` after discovery.
pub const GRACE_WINDOW_HOURS: i64 = 24;

/// Counts reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Posts after the merge
    pub total: usize,
    /// Posts admitted by this merge
    pub added: usize,
    /// Posts present before this merge
    pub existing: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Posts admitted by this merge, in candidate order
    pub new_posts: Vec<Post>,
    /// Existing posts followed by the new ones, statuses aged
    pub merged_posts: Vec<Post>,
    pub stats: MergeStats,
}

/// Merge candidates into `existing` now.
pub fn merge(existing: Vec<Post>, candidates: Vec<ContentItem>) -> MergeResult {
    merge_at(existing, candidates, Utc::now())
}

/// Merge candidates into `existing` at `now`.
///
/// A candidate whose URL is already stored, or was admitted earlier in the
/// same call, is dropped; the first occurrence wins. Stored posts are never
/// overwritten apart from status aging.
pub fn merge_at(existing: Vec<Post>, candidates: Vec<ContentItem>, now: DateTime<Utc>) -> MergeResult {
    let existing_count = existing.len();
    let mut seen: HashSet<String> = existing.iter().map(|p| p.url.clone()).collect();

    let new_posts: Vec<Post> = candidates
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .map(|item| Post::admit(item, now))
        .collect();

    let mut merged_posts = existing;
    merged_posts.extend(new_posts.iter().cloned());
    age_statuses(&mut merged_posts, now);

    MergeResult {
        stats: MergeStats {
            total: merged_posts.len(),
            added: new_posts.len(),
            existing: existing_count,
        },
        new_posts,
        merged_posts,
    }
}

/// Demote `New` posts older than the grace window. Returns the number demoted.
pub fn age_statuses(posts: &mut [Post], now: DateTime<Utc>) -> usize {
    let grace = chrono::Duration::hours(GRACE_WINDOW_HOURS);
    let mut demoted = 0;
    for post in posts
        .iter_mut()
        .filter(|p| p.status == PostStatus::New && now - p.discovered_at > grace)
    {
        post.status = PostStatus::Existing;
        demoted += 1;
    }
    demoted
}
