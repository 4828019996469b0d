//! Discovered items and stored posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A qualifying item found on a page during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub url: String,
    pub title: String,
    pub text_excerpt: String,
    pub published_at: Option<String>,
}

/// Age class of a stored post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostStatus {
    New,
    Existing,
}

/// A qualifying URL persisted in the post store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Item URL (unique key)
    pub url: String,

    /// Item title
    pub title: String,

    /// Leading text of the item
    #[serde(default)]
    pub excerpt: String,

    /// Publication date as printed on the site
    #[serde(default)]
    pub published_at: Option<String>,

    /// First time this URL was admitted
    pub discovered_at: DateTime<Utc>,

    /// New until the grace window has passed
    pub status: PostStatus,
}

impl Post {
    /// Admit a candidate item as a new post.
    pub fn admit(item: ContentItem, now: DateTime<Utc>) -> Self {
        Self {
            url: item.url,
            title: item.title,
            excerpt: item.text_excerpt,
            published_at: item.published_at,
            discovered_at: now,
            status: PostStatus::New,
        }
    }

    /// Format post for display using a template.
    ///
    /// Supported placeholders: `{title}`, `{url}`, `{published}`,
    /// `{discovered}`, `{status}`.
    pub fn format(&self, template: &str) -> String {
        let status = match self.status {
            PostStatus::New => "NEW",
            PostStatus::Existing => "existing",
        };
        template
            .replace("{title}", &self.title)
            .replace("{url}", &self.url)
            .replace("{published}", self.published_at.as_deref().unwrap_or("-"))
            .replace(
                "{discovered}",
                &self.discovered_at.format("%Y-%m-%d %H:%M").to_string(),
            )
            .replace("{status}", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> ContentItem {
        ContentItem {
            url: "https://example.gov/news/e-invoicing-2026".to_string(),
            title: "E-invoicing mandatory from 2026".to_string(),
            text_excerpt: "Structured electronic invoices become mandatory.".to_string(),
            published_at: Some("2025-03-01".to_string()),
        }
    }

    #[test]
    fn test_admit_marks_new() {
        let now = Utc::now();
        let post = Post::admit(sample_item(), now);
        assert_eq!(post.status, PostStatus::New);
        assert_eq!(post.discovered_at, now);
        assert_eq!(post.excerpt, "Structured electronic invoices become mandatory.");
    }

    #[test]
    fn test_format() {
        let post = Post::admit(sample_item(), Utc::now());
        assert_eq!(
            post.format("[{status}] {title} ({published})"),
            "[NEW] E-invoicing mandatory from 2026 (2025-03-01)"
        );
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&PostStatus::Existing).unwrap();
        assert_eq!(json, "\"Existing\"");
    }
}
