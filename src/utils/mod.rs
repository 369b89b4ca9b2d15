//! Utility functions and helpers.

pub mod clock;
pub mod http;
pub mod log;
pub mod url;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize whitespace, then strip every `patterns` substring.
pub fn clean_text(text: &str, patterns: &[String]) -> String {
    let mut result = normalize_whitespace(text);
    for pattern in patterns {
        if !pattern.is_empty() {
            result = result.replace(pattern.as_str(), "");
        }
    }
    result.trim().to_string()
}
