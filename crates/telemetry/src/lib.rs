//! Structured logging setup for Lactoserv: an `EnvFilter`-driven
//! `tracing-subscriber` installer, plus the per-component hierarchical
//! logger every `Component` is handed at `init` time.

mod config;
mod init;
pub mod logger;

pub use config::Config;
pub use init::{init_telemetry, Error, TelemetryGuard};
