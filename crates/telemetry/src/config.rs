use serde::{Deserialize, Serialize};

/// Logging configuration: an `EnvFilter` directive string (`RUST_LOG`
/// syntax, e.g. `"info,lactoserv::host_manager=debug"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

fn default_level() -> String {
    "info".to_string()
}
