//! Typed configuration records and a thin loader built on the `config`
//! crate (spec.md §A.2). Parsing arbitrary config *files* and validating
//! generic option schemas is an external collaborator per spec.md §1 —
//! what lives here is the vocabulary every component's `CONFIG_CLASS`
//! deserializes from, plus just enough of a loader (TOML/YAML + env
//! overlay) that the binary has something to call.

mod application;
mod endpoint;
mod host;
mod rate_limit;

pub use application::ApplicationConfig;
pub use endpoint::{EndpointConfig, EndpointServicesConfig, Listen, MountConfig, Protocol};
pub use host::HostConfig;
pub use rate_limit::{RateLimitTimeUnit, RateLimiterConfig};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CONFIG_PATH: &str = "/etc/lactoserv/config.yaml";

/// The top-level configuration record a freshly parsed config file
/// deserializes into, matching spec.md §6's vocabulary exactly:
/// `hosts`, `services` (none at the root beyond what endpoints nest),
/// `applications`, `endpoints`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct WebappRootConfig {
    pub telemetry: telemetry::Config,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    pub stop_grace: StopGraceConfig,
}

/// The two grace windows spec.md §4.6 names: how long `WebappRoot::stop`
/// waits after requesting endpoint/application stop before starting the
/// next layer's stop in parallel.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
#[serde(default)]
pub struct StopGraceConfig {
    #[serde(with = "humantime_serde")]
    pub endpoint_stop_grace_period: std::time::Duration,
    #[serde(with = "humantime_serde")]
    pub application_stop_grace_period: std::time::Duration,
}

impl Default for StopGraceConfig {
    fn default() -> Self {
        Self {
            endpoint_stop_grace_period: std::time::Duration::from_millis(250),
            application_stop_grace_period: std::time::Duration::from_millis(250),
        }
    }
}

impl WebappRootConfig {
    /// Loads layered config: an optional file (explicit path, else
    /// `/etc/lactoserv/config.yaml` if present) overlaid by `LACTOSERV_*`
    /// environment variables, matching the teacher's `Config::try_read`
    /// shape.
    pub fn try_read(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else if std::fs::exists(DEFAULT_CONFIG_PATH).unwrap_or(false) {
            builder = builder.add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LACTOSERV").try_parsing(true).separator("__"),
        );
        let raw: serde_json::Value = builder.build()?.try_deserialize()?;
        serde_path_to_error::deserialize(raw).map_err(ConfigError::Deserialize)
    }

    /// Structural validation beyond what serde's `deny_unknown_fields`
    /// and field types already enforce (spec.md §4.5/§7: components fail
    /// fast at `init`, this is the root's own pre-flight pass before any
    /// child `init` runs).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for host in &self.hosts {
            host.validate()?;
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        let known_apps: std::collections::HashSet<&str> =
            self.applications.iter().map(|a| a.name.as_str()).collect();
        for endpoint in &self.endpoints {
            for mount in &endpoint.mounts {
                if !known_apps.contains(mount.application.as_str()) {
                    return Err(ConfigError::Invalid {
                        field: "mounts[].application",
                        constraint: "must name a configured application",
                        value: mount.application.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
