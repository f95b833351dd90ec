use ::tracing::Span;

/// The opaque hierarchical logger handed to a `Component` at `init` time
/// (spec.md §3, invariant iv: assigned once, never reassigned).
///
/// Wraps a `tracing::Span` carrying the component's dotted tree path
/// (`root.hosts.main`); every log call a component makes is entered into
/// this span so it's attributable to the component that made it without
/// that component needing to thread its own name through every log
/// statement.
#[derive(Debug, Clone)]
pub struct Logger {
    path: String,
    span: Span,
}

impl Logger {
    /// Builds the root logger, with an empty tree path.
    #[must_use]
    pub fn root() -> Self {
        let span = ::tracing::info_span!("root");
        Self { path: String::new(), span }
    }

    /// Derives a child logger for a component named `name` mounted under
    /// this one, extending the dotted tree path.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.path)
        };
        let span = ::tracing::info_span!("component", path = %path);
        Self { path, span }
    }

    /// The component's dotted tree path, e.g. `root.hosts.main`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runs `f` with this logger's span entered, so any `tracing` calls
    /// inside `f` pick up the `path` field.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        self.span.in_scope(f)
    }

    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_paths_are_dotted() {
        let root = Logger::root();
        assert_eq!(root.path(), "");
        let hosts = root.child("hosts");
        assert_eq!(hosts.path(), "hosts");
        let main = hosts.child("main");
        assert_eq!(main.path(), "hosts.main");
    }
}
