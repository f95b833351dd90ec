use std::sync::{Arc, RwLock};

use rustc_hash::FxHashSet;
use telemetry::Logger;

/// The whole-tree path index (spec.md §3: `RootControlContext`). Mutated
/// only during `init`/`start`, and only by adding paths — per spec.md §5
/// the context tree "is mutated only during init/start and only by adding
/// nodes (never removing) during that phase." Reads during `running`
/// require no synchronization beyond the `RwLock` read side, which never
/// contends with a writer once start-up has finished.
#[derive(Debug, Default)]
pub struct RootControlContext {
    paths: RwLock<FxHashSet<String>>,
}

impl RootControlContext {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, path: &str) {
        self.paths.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(path.to_string());
    }

    /// `true` iff some component has registered itself at `path`. Used by
    /// components that need to check for the presence of a sibling
    /// without holding a direct reference to it.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.read().unwrap_or_else(std::sync::PoisonError::into_inner).contains(path)
    }
}

/// Binds a component to its position in the tree: its dotted path, its
/// derived [`Logger`], and a handle to the root's path index. Immutable
/// once handed to a component at `init` (spec.md §3 invariant iv).
#[derive(Debug, Clone)]
pub struct Context {
    path: String,
    logger: Logger,
    root: Arc<RootControlContext>,
}

impl Context {
    /// The context handed to `WebappRoot` itself, at the base of the tree.
    #[must_use]
    pub fn root(root: Arc<RootControlContext>) -> Self {
        let logger = Logger::root();
        root.register(logger.path());
        Self { path: String::new(), logger, root }
    }

    /// Derives a child context for a component named `name` mounted
    /// directly under the component holding `self`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let logger = self.logger.child(name);
        let path = logger.path().to_string();
        self.root.register(&path);
        Self { path, logger, root: Arc::clone(&self.root) }
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn root(&self) -> &Arc<RootControlContext> {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_contexts_register_their_path() {
        let root_ctx = RootControlContext::new();
        let root = Context::root(Arc::clone(&root_ctx));
        let hosts = root.child("hosts");
        let main = hosts.child("main");

        assert_eq!(main.path(), "hosts.main");
        assert!(root_ctx.contains("hosts"));
        assert!(root_ctx.contains("hosts.main"));
        assert!(!root_ctx.contains("services"));
    }
}
