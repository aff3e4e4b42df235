//! URL handling module
//!
//! This module provides URL normalization, dedup fingerprints and catalog category
//! id extraction.

mod normalize;

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use url::Url;

// Re-export main functions
pub use normalize::normalize_url;

/// Patterns that carry a catalog category id, tried in order
static CATEGORY_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"/category/(\d+)", r"[?&]catId=(\d+)", r"/(\d+)/?$"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Computes the dedup fingerprint of a URL
///
/// The fingerprint is the hex-encoded SHA-256 digest of the normalized URL, so
/// `https://example.com/a?b=1&a=2#top` and `https://example.com/a?a=2&b=1` share one
/// fingerprint. URLs that fail normalization fall back to hashing their raw form.
///
/// # Examples
///
/// ```
/// use kongfz_crawler::url::fingerprint;
/// use url::Url;
///
/// let a = Url::parse("https://example.com/list?page=2&catId=7#top").unwrap();
/// let b = Url::parse("https://example.com/list?catId=7&page=2").unwrap();
/// assert_eq!(fingerprint(&a), fingerprint(&b));
/// ```
pub fn fingerprint(url: &Url) -> String {
    let normalized = normalize_url(url.as_str())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());
    fingerprint_str(&normalized)
}

/// Hex-encoded SHA-256 digest of an arbitrary key
pub fn fingerprint_str(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts the catalog category id from a category or listing URL
///
/// Recognizes `/category/<id>`, a `catId=<id>` query parameter and a trailing
/// numeric path segment, in that order.
///
/// # Examples
///
/// ```
/// use kongfz_crawler::url::extract_category_id;
///
/// assert_eq!(extract_category_id("https://book.kongfz.com/category/43/"), Some("43".to_string()));
/// assert_eq!(extract_category_id("https://search.kongfz.com/list?catId=8&page=1"), Some("8".to_string()));
/// assert_eq!(extract_category_id("https://www.kongfz.com/"), None);
/// ```
pub fn extract_category_id(url: &str) -> Option<String> {
    CATEGORY_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
