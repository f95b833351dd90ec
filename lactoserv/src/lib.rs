//! Lactoserv: a configurable HTTP-family application server. `main.rs`
//! is a thin binary over this library.

pub mod access_log;
pub mod application;
pub mod component;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod host_manager;
pub mod http;
pub mod rate_limit;
pub mod util;
pub mod webapp_root;
pub mod wrangler;
