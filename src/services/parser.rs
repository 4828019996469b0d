// src/services/parser.rs

//! HTML parsing behind the [`PageParser`] seam.
//!
//! The crawl, detection and merge logic only see URLs, text and
//! [`ContentItem`]s; everything that knows about markup lives here.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ContentItem;
use crate::utils::text::{normalize_whitespace, truncate_graphemes};
use crate::utils::url::{crawlable_link, normalize, same_site};

/// Graphemes kept in an item excerpt.
pub const EXCERPT_LENGTH: usize = 300;

/// Elements whose text never counts as page content.
const HIDDEN_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer",
];

/// Title and readable text of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub title: String,
    pub body: String,
}

impl PageText {
    /// Title and body joined for keyword matching.
    pub fn combined(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

/// Extraction of links, text and candidate items from fetched markup.
pub trait PageParser: Send + Sync {
    /// Followable same-site page links, normalized and deduplicated.
    fn extract_links(&self, html: &str, base_url: &str) -> Vec<String>;

    /// Items the page offers: the page itself and any listed entries.
    fn extract_candidate_items(&self, html: &str, base_url: &str) -> Vec<ContentItem>;

    /// Title and visible text of the page.
    fn extract_text(&self, html: &str) -> PageText;
}

/// [`PageParser`] backed by the `scraper` crate.
pub struct HtmlPageParser {
    link: Selector,
    title: Selector,
    h1: Selector,
    content_root: Selector,
    body: Selector,
    listing_item: Selector,
    item_heading_link: Selector,
    item_heading: Selector,
    any_link: Selector,
    time: Selector,
    published_meta: Selector,
}

impl HtmlPageParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            link: Self::parse_selector("a[href]")?,
            title: Self::parse_selector("title")?,
            h1: Self::parse_selector("h1")?,
            content_root: Self::parse_selector("main, [role=main], #content, article")?,
            body: Self::parse_selector("body")?,
            listing_item: Self::parse_selector(
                "li.news-item, .views-row, .news-item, .teaser, .card, .search-result, main article",
            )?,
            item_heading_link: Self::parse_selector(
                "h2 a[href], h3 a[href], h4 a[href], .title a[href]",
            )?,
            item_heading: Self::parse_selector("h2, h3, h4, .title")?,
            any_link: Self::parse_selector("a[href]")?,
            time: Self::parse_selector("time")?,
            published_meta: Self::parse_selector(
                "meta[property='article:published_time'], meta[name='dcterms.date'], meta[name=date]",
            )?,
        })
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }

    fn page_title(&self, document: &Html) -> String {
        document
            .select(&self.h1)
            .map(visible_text)
            .find(|t| !t.is_empty())
            .or_else(|| {
                document
                    .select(&self.title)
                    .next()
                    .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            })
            .unwrap_or_default()
    }

    fn page_body(&self, document: &Html) -> String {
        document
            .select(&self.content_root)
            .next()
            .or_else(|| document.select(&self.body).next())
            .map(visible_text)
            .unwrap_or_default()
    }

    fn published_at(&self, document: &Html) -> Option<String> {
        document
            .select(&self.published_meta)
            .find_map(|m| m.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| document.select(&self.time).find_map(time_value))
    }

    fn listing_entry(&self, element: ElementRef<'_>, base: &Url) -> Option<ContentItem> {
        let anchor = element
            .select(&self.item_heading_link)
            .next()
            .or_else(|| element.select(&self.any_link).next())?;
        let href = anchor.value().attr("href")?;
        let resolved = base.join(href.trim()).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") || !same_site(base, &resolved) {
            return None;
        }
        let url = normalize(resolved.as_str())?;

        let title = element
            .select(&self.item_heading)
            .map(visible_text)
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| visible_text(anchor));
        if title.is_empty() {
            return None;
        }

        Some(ContentItem {
            url,
            title,
            text_excerpt: truncate_graphemes(&visible_text(element), EXCERPT_LENGTH),
            published_at: element.select(&self.time).find_map(time_value),
        })
    }
}

impl PageParser for HtmlPageParser {
    fn extract_links(&self, html: &str, base_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut seen = HashSet::new();
        document
            .select(&self.link)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| crawlable_link(&base, href))
            .filter(|link| seen.insert(link.clone()))
            .collect()
    }

    fn extract_candidate_items(&self, html: &str, base_url: &str) -> Vec<ContentItem> {
        let Some(page_url) = normalize(base_url) else {
            return Vec::new();
        };
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut items = Vec::new();
        let title = self.page_title(&document);
        let body = self.page_body(&document);
        if !title.is_empty() {
            items.push(ContentItem {
                url: page_url.clone(),
                title,
                text_excerpt: truncate_graphemes(&body, EXCERPT_LENGTH),
                published_at: self.published_at(&document),
            });
        }

        for element in document.select(&self.listing_item) {
            if let Some(item) = self.listing_entry(element, &base) {
                if item.url != page_url {
                    items.push(item);
                }
            }
        }
        items
    }

    fn extract_text(&self, html: &str) -> PageText {
        let document = Html::parse_document(html);
        PageText {
            title: self.page_title(&document),
            body: self.page_body(&document),
        }
    }
}

/// Whitespace-normalized text of an element, skipping scripts and chrome.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        // Only ancestors inside `element` count, so an h1 within a header still reads.
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            });
        if !hidden {
            parts.push(text.trim());
        }
    }
    normalize_whitespace(&parts.join(" "))
}

fn time_value(element: ElementRef<'_>) -> Option<String> {
    element
        .value()
        .attr("datetime")
        .map(|s| s.trim().to_string())
        .or_else(|| Some(visible_text(element)))
        .filter(|s| !s.is_empty())
}
