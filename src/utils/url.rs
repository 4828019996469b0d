// src/utils/url.rs

//! Link normalization and filtering for the site traversal.

use url::Url;

/// File extensions that never lead to an HTML page.
const RESOURCE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf", "csv",
    "txt", "zip", "rar", "7z", "gz", "tar", "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp",
    "ico", "tif", "tiff", "mp3", "mp4", "avi", "mov", "wmv", "webm", "css", "js", "json",
    "xml", "rss", "woff", "woff2", "ttf", "eot", "exe", "msi", "dmg",
];

/// Strip query string and fragment from an absolute URL.
///
/// # Examples
/// ```
/// use einvoice_watch::utils::url::normalize;
///
/// assert_eq!(
///     normalize("https://example.gov/news?page=2#top"),
///     Some("https://example.gov/news".to_string())
/// );
/// ```
pub fn normalize(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Resolve an `href` found on `base` into a followable, normalized link.
///
/// Returns `None` for mail/tel/javascript links, bare fragments, links to
/// other hosts and links to known non-HTML resources.
pub fn crawlable_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["mailto:", "tel:", "javascript:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if !same_site(base, &resolved) {
        return None;
    }
    if is_resource(&resolved) {
        return None;
    }

    resolved.set_query(None);
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Join a relative API `path` onto a service base URL.
///
/// The base is treated as a directory, so `http://host/proxy` and
/// `http://host/proxy/` both resolve `api/scrape` under `/proxy/`.
pub fn service_endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
}

/// Whether two URLs are on the same host.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Whether the URL path ends in a known non-HTML file extension.
pub fn is_resource(url: &Url) -> bool {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            RESOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}
