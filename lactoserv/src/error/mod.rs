//! Error taxonomy (spec.md §7): five kinds, distinguished by how they
//! propagate and whether they ever reach the wire.

mod api;

pub use api::ApiError;

use displaydoc::Display;
use thiserror::Error;

use crate::component::ComponentError;

/// Invalid or missing required configuration. Reported at `init`; fatal to
/// the root (propagates up through `WebappRoot::start`, unwinding already
/// -started siblings).
#[derive(Debug, Error, Display)]
pub enum ConfigError {
    /// missing required field `{0}`
    MissingField(&'static str),
    /// `{field}` must satisfy {constraint}, got `{value}`
    Invalid { field: &'static str, constraint: &'static str, value: String },
    /// host config must set exactly one of `certificate+privateKey` or `selfSigned`
    AmbiguousCertSource,
    /// an `http2` endpoint requires an associated HostManager
    Http2RequiresHostManager,
    /// failed to parse config file: {0}
    Deserialize(#[from] serde_path_to_error::Error<serde_json::Error>),
    /// failed to load config layers: {0}
    Load(#[from] config::ConfigError),
}

/// A lifecycle transition attempted from the wrong state (spec.md §4.5). A
/// programmer error: never a consequence of bad input.
#[derive(Debug, Error, Display)]
pub enum StateError {
    /// `start` called on a component in state `{0:?}`, expected `stopped`
    StartFromWrongState(crate::component::LifecycleState),
    /// `stop` called on a component in state `{0:?}`, expected `running`
    StopFromWrongState(crate::component::LifecycleState),
    /// `init` called more than once on the same component instance
    DoubleInit,
}

/// Bind failure, TLS handshake failure, or certificate parse failure.
/// Reported through the component's logger; the endpoint that hit it
/// fails to start, the rest of the tree is unaffected beyond that.
#[derive(Debug, Error, Display)]
pub enum ResourceError {
    /// failed to bind listener on {interface}:{port}: {source}
    Bind { interface: String, port: u16, source: std::io::Error },
    /// TLS handshake failed: {0}
    TlsHandshake(String),
    /// certificate material is structurally invalid: {0}
    InvalidCertificate(String),
    /// private key material is structurally invalid: {0}
    InvalidPrivateKey(String),
    /// unknown TLS server name `{0}`
    UnknownHost(String),
    /// self-signed certificate generation failed: {0}
    CertGeneration(String),
}

/// Client-induced failure: malformed request, timeout, connection reset.
/// Logged at debug; the request completes with the matching HTTP status.
/// Never propagates past the request task that observed it.
#[derive(Debug, Error, Display)]
pub enum PeerError {
    /// malformed request: {0}
    Malformed(String),
    /// request timed out
    Timeout,
    /// connection reset by peer
    Reset,
    /// byte range not satisfiable for a {0}-byte resource
    RangeNotSatisfiable(u64),
}

/// A stop exceeded its grace window. Warned and treated as best-effort;
/// the caller proceeds regardless (spec.md §5 "Cancellation & timeouts").
#[derive(Debug, Error, Display)]
pub enum ShutdownError {
    /// component `{0}` did not finish stopping within its grace window
    GraceWindowExceeded(String),
}

/// The aggregate error type `main` and `WebappRoot`'s `meltdown::Service`
/// impl propagate: every failure mode a full `init`/`start`/`stop` cycle
/// can surface, collapsed to one type for the binary's top-level
/// `Result`.
#[derive(Debug, Error, Display)]
pub enum RuntimeError {
    /// {0}
    Config(#[from] ConfigError),
    /// {0}
    Component(#[from] ComponentError),
    /// {0}
    Shutdown(#[from] ShutdownError),
}
