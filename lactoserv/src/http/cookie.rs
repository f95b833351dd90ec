//! A strict RFC 6265 `Cookie` header parser, and a `Set-Cookie` writer for
//! the attribute vocabulary spec.md §4.8 enumerates (spec.md §B restores
//! the writer half as a natural pairing for the parser the spec calls
//! out).

use std::fmt;

use percent_encoding::{percent_decode_str, percent_encode, NON_ALPHANUMERIC};

use crate::util::Moment;

/// One name/value pair parsed out of a request's `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// `true` iff `b` is in the RFC 2616 `token` character class cookie names
/// are drawn from: any US-ASCII char except CTLs and separators.
fn is_token_char(b: u8) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";
    b.is_ascii_graphic() && !SEPARATORS.contains(&b)
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

/// An RFC 6265 `cookie-octet`: any printable US-ASCII except `"`, `,`,
/// `;`, `\`, and space.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

fn parse_value(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(raw);
    if !inner.bytes().all(is_cookie_octet) {
        return None;
    }
    percent_decode_str(inner).decode_utf8().ok().map(std::borrow::Cow::into_owned)
}

/// Parses a `Cookie` request header value into individual cookies. Lenient
/// about delimiter whitespace; a cookie whose value fails percent-decoding
/// is skipped without aborting the rest of the parse (spec.md §4.8).
#[must_use]
pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for pair in value.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, raw_value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if !is_valid_name(name) {
            continue;
        }
        let Some(decoded) = parse_value(raw_value.trim()) else {
            continue;
        };
        cookies.push(Cookie { name: name.to_string(), value: decoded });
    }
    cookies
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Builds a `Set-Cookie` header value. Covers exactly the attribute
/// vocabulary spec.md §4.8 lists: `httpOnly`, `partitioned`, `secure`
/// (boolean), `domain`, `path` (string), `expires` (moment), `maxAge`
/// (duration), `sameSite`.
#[derive(Debug, Clone, Default)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    expires: Option<Moment>,
    max_age: Option<std::time::Duration>,
    same_site: Option<SameSite>,
    http_only: bool,
    secure: bool,
    partitioned: bool,
}

impl SetCookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn expires(mut self, expires: Moment) -> Self {
        self.expires = Some(expires);
        self
    }

    #[must_use]
    pub fn max_age(mut self, max_age: std::time::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn http_only(mut self, value: bool) -> Self {
        self.http_only = value;
        self
    }

    #[must_use]
    pub fn secure(mut self, value: bool) -> Self {
        self.secure = value;
        self
    }

    #[must_use]
    pub fn partitioned(mut self, value: bool) -> Self {
        self.partitioned = value;
        self
    }

    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!(
            "{}={}",
            self.name,
            percent_encode(self.value.as_bytes(), NON_ALPHANUMERIC)
        );
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(expires) = self.expires {
            out.push_str("; Expires=");
            out.push_str(&expires.to_http_date());
        }
        if let Some(max_age) = self.max_age {
            out.push_str("; Max-Age=");
            out.push_str(&max_age.as_secs().to_string());
        }
        if let Some(same_site) = self.same_site {
            out.push_str("; SameSite=");
            out.push_str(&same_site.to_string());
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.partitioned {
            out.push_str("; Partitioned");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_cookie_list() {
        let cookies = parse_cookie_header("a=1; b=2");
        assert_eq!(cookies, vec![
            Cookie { name: "a".into(), value: "1".into() },
            Cookie { name: "b".into(), value: "2".into() },
        ]);
    }

    #[test]
    fn parses_quoted_percent_encoded_value() {
        let cookies = parse_cookie_header(r#"session="abc%20def""#);
        assert_eq!(cookies[0].value, "abc def");
    }

    #[test]
    fn skips_malformed_percent_encoding_but_keeps_parsing() {
        // %ff is a valid percent-escape but not valid UTF-8 on its own.
        let cookies = parse_cookie_header("bad=%ff; good=ok");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "good");
    }

    #[test]
    fn rejects_invalid_name() {
        let cookies = parse_cookie_header("(bad)=1; good=1");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "good");
    }

    #[test]
    fn writes_full_attribute_vocabulary() {
        let header = SetCookie::new("sid", "xyz")
            .domain("example.com")
            .path("/")
            .max_age(std::time::Duration::from_secs(3600))
            .same_site(SameSite::Lax)
            .secure(true)
            .http_only(true)
            .to_header_value();
        assert!(header.starts_with("sid=xyz"));
        assert!(header.contains("Domain=example.com"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
    }
}
