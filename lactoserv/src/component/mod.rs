//! The component lifecycle state machine (spec.md §4.5):
//!
//! ```text
//! new --init--> stopped --start--> running --stop--> stopped
//! ```
//!
//! `init` must precede the first `start`; `start` requires `stopped`;
//! `stop` requires `running`. [`ComponentBase`] is the bookkeeping every
//! concrete component (`HostManager`, `RateLimitService`, `NetworkEndpoint`,
//! ...) embeds to get these invariants for free; [`Component`] is the
//! dyn-compatible trait object interface the manager types hold their
//! heterogeneous children through.

pub mod context;

pub use context::{Context, RootControlContext};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use displaydoc::Display;
use futures::future::BoxFuture;
use telemetry::Logger;
use thiserror::Error;

use crate::error::{ConfigError, ResourceError, StateError};

/// A component's position in spec.md §4.5's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    New = 0,
    Initializing = 1,
    Stopped = 2,
    Starting = 3,
    Running = 4,
    Stopping = 5,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Initializing,
            2 => Self::Stopped,
            3 => Self::Starting,
            4 => Self::Running,
            _ => Self::Stopping,
        }
    }
}

/// Aggregates the error kinds a lifecycle transition can fail with, so
/// `Component::init`/`start` have one return type to propagate (spec.md
/// §7: resource errors during init/start "propagate to the root").
#[derive(Debug, Error, Display)]
pub enum ComponentError {
    /// {0}
    Config(#[from] ConfigError),
    /// {0}
    State(#[from] StateError),
    /// {0}
    Resource(#[from] ResourceError),
}

/// Shared lifecycle bookkeeping embedded by every concrete component.
/// Enforces spec.md §3's invariants (i)-(iii) and assigns the component's
/// [`Context`]/[`Logger`] exactly once (invariant iv).
#[derive(Debug)]
pub struct ComponentBase {
    name: String,
    state: AtomicU8,
    context: OnceLock<Context>,
}

impl ComponentBase {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: AtomicU8::new(LifecycleState::New as u8), context: OnceLock::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Panics if called before `init` has completed — every concrete
    /// component's `init` must call [`Self::begin_init`] before touching
    /// its own config or doing anything that logs.
    #[must_use]
    pub fn context(&self) -> &Context {
        self.context.get().expect("ComponentBase::context read before init")
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        self.context().logger()
    }

    /// Call at the top of a concrete component's `init`. Assigns the
    /// context (once) and transitions `new -> initializing`.
    pub fn begin_init(&self, ctx: Context) -> Result<(), StateError> {
        if self.state() != LifecycleState::New {
            return Err(StateError::DoubleInit);
        }
        self.context.set(ctx).map_err(|_| StateError::DoubleInit)?;
        self.state.store(LifecycleState::Initializing as u8, Ordering::Release);
        Ok(())
    }

    /// Call once a concrete component's `init` body has validated its
    /// config without error. Transitions `initializing -> stopped`.
    pub fn finish_init(&self) {
        self.state.store(LifecycleState::Stopped as u8, Ordering::Release);
    }

    /// Call at the top of `start`. Fails if the component isn't `stopped`.
    pub fn begin_start(&self) -> Result<(), StateError> {
        if self.state() != LifecycleState::Stopped {
            return Err(StateError::StartFromWrongState(self.state()));
        }
        self.state.store(LifecycleState::Starting as u8, Ordering::Release);
        Ok(())
    }

    pub fn finish_start(&self) {
        self.state.store(LifecycleState::Running as u8, Ordering::Release);
    }

    /// Call at the top of `stop`. Fails if the component isn't `running`.
    pub fn begin_stop(&self) -> Result<(), StateError> {
        if self.state() != LifecycleState::Running {
            return Err(StateError::StopFromWrongState(self.state()));
        }
        self.state.store(LifecycleState::Stopping as u8, Ordering::Release);
        Ok(())
    }

    pub fn finish_stop(&self) {
        self.state.store(LifecycleState::Stopped as u8, Ordering::Release);
    }
}

/// Implemented by every node in the component tree. Methods return boxed
/// futures rather than using `async fn` so that managers can hold
/// heterogeneous children as `Vec<Box<dyn Component>>` (native
/// `async fn`-in-trait isn't dyn-compatible).
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> LifecycleState;

    /// Must not perform observable side effects (spec.md §4.5: "no
    /// network bind, no file write"); it may read and validate config.
    fn init<'a>(&'a self, ctx: Context, is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>>;

    /// Acquires resources (binds, spawns, generates certs, ...).
    fn start<'a>(&'a self, is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>>;

    /// Releases resources. `will_reload` hints that a fast-follow `start`
    /// is expected, so preservable state (e.g. self-signed certs) should
    /// be kept rather than discarded.
    fn stop<'a>(&'a self, will_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let base = ComponentBase::new("widget");
        assert_eq!(base.state(), LifecycleState::New);

        let root = RootControlContext::new();
        base.begin_init(Context::root(root)).unwrap();
        assert_eq!(base.state(), LifecycleState::Initializing);
        base.finish_init();
        assert_eq!(base.state(), LifecycleState::Stopped);

        base.begin_start().unwrap();
        base.finish_start();
        assert_eq!(base.state(), LifecycleState::Running);

        base.begin_stop().unwrap();
        base.finish_stop();
        assert_eq!(base.state(), LifecycleState::Stopped);
    }

    #[test]
    fn double_init_is_rejected() {
        let base = ComponentBase::new("widget");
        let root = RootControlContext::new();
        base.begin_init(Context::root(std::sync::Arc::clone(&root))).unwrap();
        assert!(matches!(base.begin_init(Context::root(root)), Err(StateError::DoubleInit)));
    }

    #[test]
    fn start_requires_stopped() {
        let base = ComponentBase::new("widget");
        assert!(matches!(base.begin_start(), Err(StateError::StartFromWrongState(LifecycleState::New))));
    }

    #[test]
    fn stop_requires_running() {
        let base = ComponentBase::new("widget");
        let root = RootControlContext::new();
        base.begin_init(Context::root(root)).unwrap();
        base.finish_init();
        assert!(matches!(base.begin_stop(), Err(StateError::StopFromWrongState(LifecycleState::Stopped))));
    }
}
