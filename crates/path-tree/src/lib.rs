//! A wildcard-aware prefix tree keyed on ordered path components.
//!
//! [`PathKey`] is the shared key type for both hostname lookups (rendered
//! back-to-front, e.g. `www.example.com` is stored as `[com, example,
//! www]`) and URI-path lookups (rendered front-to-back). [`TreePathMap`] is
//! the trie built on top of it, used both to map hostnames to TLS contexts
//! and to map URI path prefixes to mounted applications.

mod key;
mod map;

pub use key::PathKey;
pub use map::{Match, TreePathMap};
