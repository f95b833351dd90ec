//! The `Application` contract (spec.md §4.4, glossary): request handlers
//! are resolved by name at endpoint start-time, not wired in at
//! construction (spec.md §4.6 "decouples construction order from binding
//! order"). Concrete applications (static file server, simple response,
//! redirector) are external collaborators (spec.md §1); this module only
//! defines the seam they plug into.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::Bytes;
use path_tree::PathKey;

use crate::http::Request;

/// The matched mount prefix and the request-path remainder handed to an
/// `Application` on each dispatch (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct DispatchInfo {
    /// The URI-path prefix the mount matched on.
    pub base: PathKey,
    /// The remainder of the request path after `base`.
    pub extra: PathKey,
}

impl DispatchInfo {
    /// `true` iff the remainder's last component is empty, i.e. the
    /// request path ended in `/` past the matched prefix (spec.md §4.4:
    /// "a trailing empty component" indicates a directory dispatch).
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.extra.components().last().is_some_and(|c| c.is_empty())
    }
}

pub type Response = hyper::Response<Full<Bytes>>;

/// A request handler. `handle_request` returning `None` means "pass to the
/// next mount" (spec.md §4.4 step 2); `Some(_)` terminates the endpoint's
/// fall-through walk.
pub trait Application: Send + Sync {
    fn name(&self) -> &str;

    fn handle_request<'a>(
        &'a self,
        request: &'a Request,
        dispatch: &'a DispatchInfo,
    ) -> BoxFuture<'a, Option<Response>>;
}

/// A name-indexed registry of live applications, resolved against by
/// `NetworkEndpoint::start` (spec.md §4.6: endpoints "resolve application
/// references by name at start-time", not at construction time).
#[derive(Default, Clone)]
pub struct ApplicationManager {
    apps: HashMap<String, Arc<dyn Application>>,
}

impl ApplicationManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, app: Arc<dyn Application>) {
        self.apps.insert(app.name().to_string(), app);
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Application>> {
        self.apps.get(name).cloned()
    }
}

impl std::fmt::Debug for ApplicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationManager").field("names", &self.apps.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_dispatch_detected_by_trailing_empty_component() {
        let dispatch = DispatchInfo { base: PathKey::from_uri_path("/a"), extra: PathKey::from_uri_path("/b/") };
        assert!(dispatch.is_directory());

        let dispatch = DispatchInfo { base: PathKey::from_uri_path("/a"), extra: PathKey::from_uri_path("/b") };
        assert!(!dispatch.is_directory());
    }
}
