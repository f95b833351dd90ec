//! The request record spec.md §3 describes: normalized method, pseudo
//! -headers, lazily-parsed cookies, the header multimap, a unique id, and
//! an optional per-request logger derived from the connection logger.

use std::sync::OnceLock;

use http::{HeaderMap, Method, Uri};
use telemetry::Logger;

use super::cookie::{self, Cookie};
use crate::util::id::RequestId;

/// `scheme`/`authority`/`path` pseudo-headers, the HTTP/2 framing concept
/// carried through even on HTTP/1.1 (spec.md §3 "pseudo-headers").
#[derive(Debug, Clone)]
pub struct PseudoHeaders {
    pub scheme: String,
    pub authority: String,
    pub path: String,
}

#[derive(Debug)]
pub struct Request {
    /// Lowercased for internal routing/filter comparisons (spec.md §3,
    /// §6 "the method is lowercased for routing and filter checks").
    method: Method,
    pseudo: PseudoHeaders,
    headers: HeaderMap,
    cookies: OnceLock<Vec<Cookie>>,
    id: RequestId,
    logger: Logger,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, uri: &Uri, authority: &str, headers: HeaderMap, id: RequestId, logger: Logger) -> Self {
        let pseudo = PseudoHeaders {
            scheme: uri.scheme_str().unwrap_or("http").to_string(),
            authority: authority.to_string(),
            path: uri.path().to_string(),
        };
        // Normalized to lowercase for internal routing/filter comparisons
        // (spec.md §6); falls back to the original token on the (never
        // expected in practice) chance lowercasing produces an invalid
        // token.
        let lowercased = method.as_str().to_ascii_lowercase();
        let method = Method::from_bytes(lowercased.as_bytes()).unwrap_or(method);
        Self { method, pseudo, headers, cookies: OnceLock::new(), id, logger }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn pseudo(&self) -> &PseudoHeaders {
        &self.pseudo
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Parses the `Cookie` header on first access and caches the result
    /// (spec.md §6: "cookie parsing occurs lazily on first access").
    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        self.cookies.get_or_init(|| {
            self.headers
                .get(http::header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(cookie::parse_cookie_header)
                .unwrap_or_default()
        })
    }
}
