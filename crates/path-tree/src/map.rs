use rustc_hash::FxHashMap;

use crate::key::PathKey;

/// Error returned by [`TreePathMap::add`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// a value is already registered under this exact key
    #[error("duplicate key in TreePathMap")]
    Duplicate,
}

struct Node<V> {
    children: FxHashMap<Box<str>, Node<V>>,
    /// Value registered under the non-wildcard key ending at this node.
    exact: Option<V>,
    /// Value registered under the wildcard key ending at this node.
    wildcard: Option<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            children: FxHashMap::default(),
            exact: None,
            wildcard: None,
        }
    }
}

/// A trie keyed on [`PathKey`], supporting longest-prefix wildcard lookups
/// with optional most-specific-to-least-specific fall-through ordering.
///
/// Mutation (`add`) is only safe during a component's `init`/`start`
/// phase; once a `NetworkEndpoint` or `HostManager` is running, lookups
/// require no synchronization (the map is read-only for the lifetime of
/// the component, per the concurrency model in spec.md §5). No `remove` is
/// provided: nodes are only ever added, never removed, during that phase.
pub struct TreePathMap<V> {
    root: Node<V>,
}

impl<V> Default for TreePathMap<V> {
    fn default() -> Self {
        Self { root: Node::default() }
    }
}

/// One match returned from [`TreePathMap::find`]: how many leading
/// components of the lookup key the registered key covered, and the value
/// registered there.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a, V> {
    pub matched_len: usize,
    pub value: &'a V,
}

impl<V> TreePathMap<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`. Adding the same key twice is an error;
    /// callers are expected to dedupe before calling (e.g. reject
    /// duplicate mounts at config-validation time).
    pub fn add(&mut self, key: &PathKey, value: V) -> Result<(), Error> {
        let mut node = &mut self.root;
        for component in key.components() {
            node = node.children.entry(component.clone()).or_default();
        }
        let slot = if key.is_wildcard() { &mut node.wildcard } else { &mut node.exact };
        if slot.is_some() {
            return Err(Error::Duplicate);
        }
        *slot = Some(value);
        Ok(())
    }

    /// Walks the trie along `key`'s components, returning every match in
    /// most-specific-to-least-specific order. The exact match (if `key` is
    /// non-wildcard and the terminal node holds one) comes first since it
    /// covers the full key; wildcard matches follow, ordered by how many
    /// components of `key` they covered, deepest first.
    fn walk(&self, key: &PathKey) -> Vec<Match<'_, V>> {
        let mut wildcards = Vec::new();
        let mut node = &self.root;
        if let Some(value) = &node.wildcard {
            wildcards.push(Match { matched_len: 0, value });
        }
        let mut matched = 0;
        for component in key.components() {
            let Some(next) = node.children.get(component) else {
                break;
            };
            node = next;
            matched += 1;
            if matched < key.len()
                && let Some(value) = &node.wildcard
            {
                wildcards.push(Match { matched_len: matched, value });
            }
        }

        let mut results = Vec::with_capacity(wildcards.len() + 1);
        if !key.is_wildcard() && matched == key.len() {
            if let Some(value) = &node.exact {
                results.push(Match { matched_len: matched, value });
            }
        }
        wildcards.sort_by(|a, b| b.matched_len.cmp(&a.matched_len));
        results.extend(wildcards);
        results
    }

    /// `find(key, wantAll)` per spec.md §4.2: with `want_all = false`,
    /// returns at most the single most-specific match; with `true`, the
    /// full most-specific-to-least-specific chain, enabling the caller to
    /// fall through.
    #[must_use]
    pub fn find(&self, key: &PathKey, want_all: bool) -> Vec<Match<'_, V>> {
        let chain = self.walk(key);
        if want_all {
            chain
        } else {
            chain.into_iter().take(1).collect()
        }
    }

    /// Convenience wrapper over `find(key, false)`.
    #[must_use]
    pub fn find_best(&self, key: &PathKey) -> Option<Match<'_, V>> {
        self.walk(key).into_iter().next()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.exact.is_none() && self.root.wildcard.is_none() && self.root.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> PathKey {
        PathKey::from_hostname(s)
    }

    fn path(s: &str) -> PathKey {
        PathKey::from_uri_path(s)
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let mut map = TreePathMap::new();
        map.add(&host("*.example.com"), "wildcard").unwrap();
        map.add(&host("api.example.com"), "exact").unwrap();

        let best = map.find_best(&host("api.example.com")).unwrap();
        assert_eq!(*best.value, "exact");
    }

    #[test]
    fn wildcard_matches_unregistered_subdomain() {
        let mut map = TreePathMap::new();
        map.add(&host("*.example.com"), "wildcard").unwrap();

        let best = map.find_best(&host("foo.example.com")).unwrap();
        assert_eq!(*best.value, "wildcard");

        let deep = map.find_best(&host("a.b.example.com")).unwrap();
        assert_eq!(*deep.value, "wildcard");
    }

    #[test]
    fn no_match_returns_none() {
        let mut map = TreePathMap::new();
        map.add(&host("example.com"), "exact").unwrap();
        assert!(map.find_best(&host("example.org")).is_none());
    }

    #[test]
    fn want_all_orders_most_specific_first() {
        let mut map = TreePathMap::new();
        map.add(&path("/"), "root").unwrap();
        map.add(&PathKey::new(["a"], true), "a-wild").unwrap();
        map.add(&path("/a/b"), "exact-ab").unwrap();

        let matches = map.find(&path("/a/b"), true);
        let values: Vec<_> = matches.iter().map(|m| *m.value).collect();
        assert_eq!(values, vec!["exact-ab", "a-wild"]);
    }

    #[test]
    fn duplicate_key_is_error() {
        let mut map = TreePathMap::new();
        map.add(&path("/a"), 1).unwrap();
        assert!(matches!(map.add(&path("/a"), 2), Err(Error::Duplicate)));
    }

    #[test]
    fn root_wildcard_matches_everything() {
        let mut map = TreePathMap::new();
        map.add(&PathKey::root_wildcard(), "catch-all").unwrap();
        map.add(&path("/specific"), "specific").unwrap();

        assert_eq!(*map.find_best(&path("/anything")).unwrap().value, "catch-all");
        assert_eq!(*map.find_best(&path("/specific")).unwrap().value, "specific");
    }

    #[test]
    fn empty_map_has_no_matches() {
        let map: TreePathMap<()> = TreePathMap::new();
        assert!(map.is_empty());
        assert!(map.find_best(&path("/")).is_none());
    }
}
