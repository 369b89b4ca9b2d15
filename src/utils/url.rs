// src/utils/url.rs

//! URL manipulation utilities.

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Resolve a potentially relative URL against a base URL.
///
/// # Examples
/// ```
/// use coursewatch::utils::url::resolve;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/courses/free/").unwrap();
/// assert_eq!(
///     resolve(&base, "/course/rust-basics/"),
///     "https://example.com/course/rust-basics/"
/// );
/// ```
pub fn resolve(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}

/// Query keys that carry a listing id on common course sites.
const ID_KEYS: &[&str] = &["course_id", "courseid", "id", "cid", "item", "slug"];

/// Extract a stable listing identifier from a URL.
///
/// Tries a well-known query key, then the last non-empty path segment
/// (`/course/learn-rust/` yields `learn-rust`).
pub fn extract_listing_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        if ID_KEYS.contains(&key.to_lowercase().as_str()) {
            return Some(value.to_string());
        }
    }

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
}

/// Extract an id with a user-supplied pattern's first capture group.
pub fn extract_with_pattern(pattern: &Regex, url: &str) -> Option<String> {
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

/// Deterministic fallback id: first 16 hex chars of the URL's SHA-256.
pub fn hashed_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Derive the id for a listing URL: pattern, then URL heuristics, then hash.
pub fn listing_id(pattern: Option<&Regex>, url: &str) -> String {
    pattern
        .and_then(|re| extract_with_pattern(re, url))
        .or_else(|| extract_listing_id(url))
        .unwrap_or_else(|| hashed_id(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Url::parse("https://example.com/courses/free/").unwrap();
        assert_eq!(
            resolve(&base, "page-2/"),
            "https://example.com/courses/free/page-2/"
        );
        assert_eq!(
            resolve(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_extract_listing_id_query_key() {
        let url = "https://example.com/enroll?courseId=48213&coupon=FREE";
        assert_eq!(extract_listing_id(url), Some("48213".to_string()));
    }

    #[test]
    fn test_extract_listing_id_path_slug() {
        let url = "https://example.com/course/learn-rust-fast/";
        assert_eq!(extract_listing_id(url), Some("learn-rust-fast".to_string()));
    }

    #[test]
    fn test_extract_listing_id_bare_host() {
        assert_eq!(extract_listing_id("https://example.com/"), None);
        assert_eq!(extract_listing_id("not a url"), None);
    }

    #[test]
    fn test_pattern_wins_over_heuristics() {
        let re = Regex::new(r"/course/([^/]+)/").unwrap();
        assert_eq!(
            listing_id(Some(&re), "https://example.com/course/go-intro/lecture/9"),
            "go-intro"
        );
        assert_eq!(
            listing_id(None, "https://example.com/course/go-intro/lecture/9"),
            "9"
        );
    }

    #[test]
    fn test_hashed_id_is_stable() {
        let a = hashed_id("https://example.com/");
        assert_eq!(a.len(), 16);
        assert_eq!(a, hashed_id("https://example.com/"));
        assert_ne!(a, hashed_id("https://example.com/other"));
        assert_eq!(listing_id(None, "https://example.com/"), a);
    }
}
