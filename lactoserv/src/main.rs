use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lactoserv::application::Application;
use lactoserv::config::{ApplicationConfig, WebappRootConfig};
use lactoserv::error::{ConfigError, RuntimeError};
use lactoserv::webapp_root::{ApplicationFactory, WebappRoot};
use meltdown::Meltdown;
use tracing::{debug, info};

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Path to the default config file.
    /// Configs in this file can be overridden by environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Rejects every application config: concrete application kinds (static
/// file server, simple response, redirector, ...) are an external
/// collaborator here (spec.md §1). A real deployment links in its own
/// `ApplicationFactory` instead of this one.
struct UnknownKindFactory;

impl ApplicationFactory for UnknownKindFactory {
    fn build(&self, config: &ApplicationConfig) -> Result<Arc<dyn Application>, ConfigError> {
        Err(ConfigError::Invalid { field: "applications[].kind", constraint: "a recognized application kind", value: config.kind.clone() })
    }
}

#[tokio::main]
async fn main() -> Result<(), RuntimeError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let mut config = match WebappRootConfig::try_read(args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to read config: {error}");
            std::process::exit(1);
        }
    };

    // Override telemetry level if verbose flag is provided
    if args.verbose {
        config.telemetry.level = "info,lactoserv=trace".to_string();
    }

    let _telemetry_guard = telemetry::init_telemetry(&config.telemetry).expect("failed to install telemetry subscriber");

    debug!("telemetry initialized");
    let pretty_config = serde_yml::to_string(&config).expect("config should always be serializable");
    tracing::debug!(config = pretty_config, "starting with config");

    #[cfg(debug_assertions)]
    tracing::warn!("running in debug mode");

    config.validate().inspect_err(|error| {
        tracing::error!(%error, "configuration validation failed");
    })?;

    let mut shutting_down = false;
    let mut root = WebappRoot::new(config, Arc::new(UnknownKindFactory));
    root.init_and_start(false).await?;

    let tasks = ["shutdown-signals", "webapp-root"];
    let mut meltdown = Meltdown::new().register("shutdown-signals", wait_for_shutdown_signal).register("webapp-root", root);

    info!(?tasks, "starting services");

    while let Some((service, result)) = meltdown.next().await {
        match result {
            Ok(()) => info!(%service, "service stopped successfully"),
            Err(error) => tracing::error!(%service, %error, "service crashed"),
        }

        if !shutting_down {
            info!("propagating shutdown signal...");
            meltdown.trigger();
            shutting_down = true;
        }
    }

    println!("shut down");

    Ok(())
}

/// Waits for the process's shutdown signal: Ctrl-C, or (on unix) SIGTERM
/// as well. Registered directly as a `meltdown::Service` via its blanket
/// impl for `FnOnce(Token) -> impl Future<Output = Result<(), E>>`.
async fn wait_for_shutdown_signal(token: meltdown::Token) -> Result<(), RuntimeError> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
            () = token => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = token => {}
        }
    }
    Ok(())
}
