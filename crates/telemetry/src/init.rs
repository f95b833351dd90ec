use ::tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::Config;

/// Errors installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// invalid logging directive: {0}
    InvalidDirective(#[from] ::tracing_subscriber::filter::ParseError),
    /// a global subscriber was already installed
    AlreadyInitialized,
}

/// Held for the process lifetime; dropping it has no effect today, but it
/// gives `main` a named value to hold (and a seam to attach flush-on-drop
/// behavior to later, the way the teacher's OTel provider triple did).
#[must_use = "dropping this immediately would be surprising even though it currently does nothing on drop"]
pub struct TelemetryGuard {
    _private: (),
}

/// Installs a `tracing_subscriber::fmt` subscriber filtered by
/// `config.level`, and routes `log`-crate records (from third-party
/// dependencies) through the same subscriber.
pub fn init_telemetry(config: &Config) -> Result<TelemetryGuard, Error> {
    let filter = EnvFilter::try_new(&config.level)?;
    let fmt_layer = ::tracing_subscriber::fmt::layer().with_target(true);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| Error::AlreadyInitialized)?;

    Ok(TelemetryGuard { _private: () })
}
