use std::fmt;

/// An ordered list of path components plus a wildcard marker.
///
/// Equality is component-wise; the `wildcard` flag participates in
/// equality so that a wildcard key never compares equal to the non-wildcard
/// key with the same components. `PathKey` is immutable after construction.
///
/// The same type serves two renderings:
/// - hostname keys are built with components in *reverse* reading order
///   (`www.example.com` → `["com", "example", "www"]`), so that the
///   right-to-left structure of DNS names lines up with the left-to-right
///   walk a trie needs for longest-prefix matching;
/// - URI-path keys are built in forward order (`/a/b` → `["a", "b"]`).
///
/// Callers pick the order when constructing a key; `PathKey` itself only
/// knows about an ordered component list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    components: Vec<Box<str>>,
    wildcard: bool,
}

impl PathKey {
    /// Builds a key from already-ordered components.
    #[must_use]
    pub fn new<I, S>(components: I, wildcard: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
            wildcard,
        }
    }

    /// The empty, non-wildcard key (matches only itself).
    #[must_use]
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
            wildcard: false,
        }
    }

    /// The empty wildcard key. A wildcard key of length 0 matches any key
    /// per the `TreePathMap` prefix invariant.
    #[must_use]
    pub fn root_wildcard() -> Self {
        Self {
            components: Vec::new(),
            wildcard: true,
        }
    }

    #[must_use]
    pub fn components(&self) -> &[Box<str>] {
        &self.components
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// A non-wildcard sub-key over `self.components()[start..end]`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` or `end > self.len()`, same as slice
    /// indexing.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            components: self.components[start..end].to_vec(),
            wildcard: false,
        }
    }

    /// Parses a dotted hostname (`www.example.com` or `*.example.com`) into
    /// a reverse-ordered key suitable for [`TreePathMap`](crate::TreePathMap)
    /// hostname lookups.
    ///
    /// `*` may only appear as the leftmost label, matching the wildcard
    /// convention in `HostConfig`/`HostManager`.
    #[must_use]
    pub fn from_hostname(hostname: &str) -> Self {
        let mut labels: Vec<&str> = hostname.split('.').collect();
        let wildcard = labels.first() == Some(&"*");
        if wildcard {
            labels.remove(0);
        }
        labels.reverse();
        Self::new(labels, wildcard)
    }

    /// Parses a `/`-separated URI path into a forward-ordered key. A
    /// trailing empty component (from a trailing `/`) is preserved, which
    /// is how callers distinguish a "directory" dispatch from a "file"
    /// dispatch (see `DispatchInfo`).
    #[must_use]
    pub fn from_uri_path(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Self::root();
        }
        Self::new(trimmed.split('/'), false)
    }

    /// Renders the key as a dotted hostname, most-significant label last,
    /// i.e. the inverse of [`Self::from_hostname`].
    #[must_use]
    pub fn to_hostname_string(&self) -> String {
        let mut labels: Vec<&str> = self.components.iter().map(AsRef::as_ref).collect();
        labels.reverse();
        let mut out = if self.wildcard {
            "*.".to_string()
        } else {
            String::new()
        };
        out.push_str(&labels.join("."));
        out
    }

    /// Renders the key as a `/`-joined URI path, i.e. the inverse of
    /// [`Self::from_uri_path`].
    #[must_use]
    pub fn to_uri_path_string(&self) -> String {
        let mut out = String::from("/");
        out.push_str(
            &self
                .components
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join("/"),
        );
        out
    }

    /// `true` iff `self` (as a wildcard key) is a prefix of `other`. A
    /// wildcard key of length 0 matches any `other`, per spec.
    #[must_use]
    pub fn is_wildcard_prefix_of(&self, other: &Self) -> bool {
        self.wildcard
            && self.components.len() <= other.components.len()
            && self.components.iter().zip(other.components.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            write!(f, "*")?;
            if !self.components.is_empty() {
                write!(f, ".")?;
            }
        }
        write!(f, "{}", self.components.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_roundtrip() {
        let key = PathKey::from_hostname("www.example.com");
        assert_eq!(key.components(), &[Box::from("com"), Box::from("example"), Box::from("www")]);
        assert!(!key.is_wildcard());
        assert_eq!(key.to_hostname_string(), "www.example.com");
    }

    #[test]
    fn wildcard_hostname() {
        let key = PathKey::from_hostname("*.example.com");
        assert!(key.is_wildcard());
        assert_eq!(key.components(), &[Box::from("com"), Box::from("example")]);
        assert_eq!(key.to_hostname_string(), "*.example.com");
    }

    #[test]
    fn uri_path_roundtrip() {
        let key = PathKey::from_uri_path("/a/b/c");
        assert_eq!(key.components(), &[Box::from("a"), Box::from("b"), Box::from("c")]);
        assert_eq!(key.to_uri_path_string(), "/a/b/c");
    }

    #[test]
    fn uri_path_trailing_slash_is_directory() {
        let key = PathKey::from_uri_path("/subdir/");
        assert_eq!(key.components().last().map(AsRef::as_ref), Some(""));
    }

    #[test]
    fn root_path_is_empty() {
        let key = PathKey::from_uri_path("/");
        assert!(key.is_empty());
    }

    #[test]
    fn wildcard_prefix_matching() {
        let wildcard = PathKey::from_hostname("*.example.com");
        assert!(wildcard.is_wildcard_prefix_of(&PathKey::from_hostname("api.example.com")));
        assert!(wildcard.is_wildcard_prefix_of(&PathKey::from_hostname("a.b.example.com")));
        assert!(!wildcard.is_wildcard_prefix_of(&PathKey::from_hostname("example.com")));
        assert!(!wildcard.is_wildcard_prefix_of(&PathKey::from_hostname("example.org")));
    }

    #[test]
    fn empty_wildcard_matches_anything() {
        let any = PathKey::root_wildcard();
        assert!(any.is_wildcard_prefix_of(&PathKey::from_hostname("example.com")));
        assert!(any.is_wildcard_prefix_of(&PathKey::root()));
    }

    #[test]
    fn slice_is_non_wildcard() {
        let key = PathKey::from_uri_path("/a/b/c");
        let sub = key.slice(0, 2);
        assert!(!sub.is_wildcard());
        assert_eq!(sub.components(), &[Box::from("a"), Box::from("b")]);
    }
}
