//! A thin, strict wrapper over [`http::HeaderMap`] (spec.md §4.8 "Strict
//! parsers/formatters for... header syntax"). `HeaderMap` already keys by
//! case-insensitive, multi-valued `HeaderName`, which is exactly spec.md
//! §3's "HTTP headers (multi-value map keyed by lowercased name)" — this
//! module adds the handful of structured accessors the dispatch pipeline
//! and `HttpConditional` need on top of the raw map.

use http::{HeaderMap, HeaderValue};

/// Parses the comma-separated entity-tag list of an `If-None-Match` or
/// `If-Match` header value into individual tag strings (still carrying
/// their surrounding quotes and any `W/` weak prefix).
#[must_use]
pub fn parse_etag_list(value: &str) -> Vec<&str> {
    if value.trim() == "*" {
        return vec!["*"];
    }
    split_respecting_quotes(value)
}

/// `true` iff `tag` (a raw `ETag` header value, e.g. `"abc123"`) appears,
/// strength-insensitively is not attempted here — spec.md §4.7 requires an
/// *exact* match against the response `ETag`, so this is a plain string
/// membership check against the parsed list.
#[must_use]
pub fn etag_list_contains(list: &str, tag: &str) -> bool {
    let tag = tag.trim();
    parse_etag_list(list).iter().any(|candidate| candidate.trim() == tag || candidate.trim() == "*")
}

fn split_respecting_quotes(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = value[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// `true` iff the request's `Cache-Control` header carries a `no-cache`
/// directive, which spec.md §4.7 says forbids freshness regardless of
/// `If-None-Match`/`If-Modified-Since`.
#[must_use]
pub fn forbids_cache(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|directive| directive.trim().eq_ignore_ascii_case("no-cache")))
}

#[must_use]
pub fn header_str<'a>(headers: &'a HeaderMap, name: impl http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v: &HeaderValue| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_list_splits_on_commas_outside_quotes() {
        let list = r#""abc", "def, ghi""#;
        assert_eq!(parse_etag_list(list), vec![r#""abc""#, r#""def, ghi""#]);
    }

    #[test]
    fn etag_list_wildcard() {
        assert_eq!(parse_etag_list("*"), vec!["*"]);
    }

    #[test]
    fn contains_matches_exact_tag() {
        assert!(etag_list_contains(r#""abc", "def""#, r#""abc""#));
        assert!(!etag_list_contains(r#""abc""#, r#""xyz""#));
    }

    #[test]
    fn no_cache_directive_is_detected_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=0, No-Cache"));
        assert!(forbids_cache(&headers));
    }
}
