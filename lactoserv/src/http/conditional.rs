//! Freshness (`304`) and `If-Range` (`206` applicability) evaluation,
//! spec.md §4.7. The only content negotiation this server performs
//! (spec.md §1 Non-goals: "does not perform content negotiation beyond
//! `If-None-Match` / `If-Modified-Since` / `If-Range` freshness checks").

use std::time::SystemTime;

use http::{HeaderMap, Method};

use super::headers::{etag_list_contains, forbids_cache, header_str};
use crate::util::Moment;

/// Resource metadata a conditional check can consult in place of response
/// headers alone, mirroring spec.md §4.7's optional `stats` parameter
/// (e.g. a static file's on-disk mtime, preferred over a `Last-Modified`
/// header when both are available).
#[derive(Debug, Clone, Copy)]
pub struct ResourceStats {
    pub mtime: SystemTime,
}

impl ResourceStats {
    #[must_use]
    pub fn last_modified(&self) -> Moment {
        Moment::from_system_time(self.mtime)
    }
}

/// Case-insensitive so callers can pass either the wire-standard uppercase
/// `Method::GET`/`Method::HEAD` or the internally-normalized lowercase
/// token `Request::method` stores (spec.md §3, §6).
fn is_get_or_head(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(Method::GET.as_str()) || method.as_str().eq_ignore_ascii_case(Method::HEAD.as_str())
}

fn response_last_modified(resp_headers: &HeaderMap, stats: Option<ResourceStats>) -> Option<Moment> {
    stats.map(ResourceStats::last_modified).or_else(|| {
        header_str(resp_headers, http::header::LAST_MODIFIED).and_then(|v| Moment::parse_http_date(v).ok())
    })
}

/// `true` iff a `304 Not Modified` may legitimately replace the content
/// response (spec.md §4.7).
#[must_use]
pub fn is_content_fresh(
    method: &Method,
    req_headers: &HeaderMap,
    resp_headers: &HeaderMap,
    stats: Option<ResourceStats>,
) -> bool {
    if !is_get_or_head(method) || forbids_cache(req_headers) {
        return false;
    }

    if let Some(if_none_match) = header_str(req_headers, http::header::IF_NONE_MATCH) {
        let Some(etag) = header_str(resp_headers, http::header::ETAG) else {
            return false;
        };
        if etag.is_empty() {
            return false;
        }
        return etag_list_contains(if_none_match, etag);
    }

    if let Some(if_modified_since) = header_str(req_headers, http::header::IF_MODIFIED_SINCE) {
        let Ok(since) = Moment::parse_http_date(if_modified_since) else {
            return false;
        };
        let Some(last_modified) = response_last_modified(resp_headers, stats) else {
            return false;
        };
        return last_modified <= since;
    }

    false
}

/// `true` iff a `206 Partial Content` response is appropriate for this
/// request, i.e. either no `If-Range` precondition was given, or the one
/// given is satisfied (spec.md §4.7).
#[must_use]
pub fn is_range_applicable(
    method: &Method,
    req_headers: &HeaderMap,
    resp_headers: &HeaderMap,
    stats: Option<ResourceStats>,
) -> bool {
    if !is_get_or_head(method) {
        return false;
    }

    let Some(if_range) = header_str(req_headers, http::header::IF_RANGE) else {
        return true;
    };

    // A weak etag (`W/"..."`) is never applicable (spec.md §4.7).
    if if_range.starts_with("W/\"") {
        return false;
    }
    if if_range.starts_with('"') {
        return header_str(resp_headers, http::header::ETAG).is_some_and(|etag| etag == if_range);
    }

    let Ok(if_unmodified_since) = Moment::parse_http_date(if_range) else {
        return false;
    };
    response_last_modified(resp_headers, stats).is_some_and(|last_modified| last_modified <= if_unmodified_since)
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn fresh_on_matching_etag() {
        let req = headers(&[(http::header::IF_NONE_MATCH, r#""abc123""#)]);
        let resp = headers(&[(http::header::ETAG, r#""abc123""#)]);
        assert!(is_content_fresh(&Method::GET, &req, &resp, None));
    }

    #[test]
    fn not_fresh_on_mismatched_etag() {
        let req = headers(&[(http::header::IF_NONE_MATCH, r#""zzz""#)]);
        let resp = headers(&[(http::header::ETAG, r#""abc123""#)]);
        assert!(!is_content_fresh(&Method::GET, &req, &resp, None));
    }

    #[test]
    fn no_cache_request_is_never_fresh() {
        let req = headers(&[
            (http::header::IF_NONE_MATCH, r#""abc123""#),
            (http::header::CACHE_CONTROL, "no-cache"),
        ]);
        let resp = headers(&[(http::header::ETAG, r#""abc123""#)]);
        assert!(!is_content_fresh(&Method::GET, &req, &resp, None));
    }

    #[test]
    fn post_is_never_fresh() {
        let req = headers(&[(http::header::IF_NONE_MATCH, r#""abc123""#)]);
        let resp = headers(&[(http::header::ETAG, r#""abc123""#)]);
        assert!(!is_content_fresh(&Method::POST, &req, &resp, None));
    }

    #[test]
    fn modified_since_falls_back_when_no_etag_check() {
        let stats = ResourceStats { mtime: SystemTime::UNIX_EPOCH };
        let req = headers(&[(http::header::IF_MODIFIED_SINCE, &stats.last_modified().to_http_date())]);
        let resp = HeaderMap::new();
        assert!(is_content_fresh(&Method::GET, &req, &resp, Some(stats)));
    }

    #[test]
    fn range_applicable_without_if_range() {
        assert!(is_range_applicable(&Method::GET, &HeaderMap::new(), &HeaderMap::new(), None));
    }

    #[test]
    fn range_not_applicable_on_etag_mismatch() {
        let req = headers(&[(http::header::IF_RANGE, r#""xyz-123""#)]);
        let resp = headers(&[(http::header::ETAG, r#""abc123""#)]);
        assert!(!is_range_applicable(&Method::GET, &req, &resp, None));
    }

    #[test]
    fn range_not_applicable_with_weak_etag() {
        let req = headers(&[(http::header::IF_RANGE, r#"W/"abc123""#)]);
        let resp = headers(&[(http::header::ETAG, r#"W/"abc123""#)]);
        assert!(!is_range_applicable(&Method::GET, &req, &resp, None));
    }
}
