use serde::{Deserialize, Serialize};

use super::rate_limit::RateLimiterConfig;
use crate::error::ConfigError;

/// One `(hostname, path, application)` binding contributed by an
/// endpoint's configuration (spec.md §3 "Mount", §6).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MountConfig {
    pub hostname: String,
    pub path: String,
    pub application: String,
}

/// The network protocol a `NetworkEndpoint` speaks (spec.md §6).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Http2,
}

impl Protocol {
    #[must_use]
    pub fn requires_tls(self) -> bool {
        !matches!(self, Self::Http)
    }
}

/// Either a `{interface, port}` listener or an inherited file descriptor
/// (spec.md §6 "Network").
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
#[serde(untagged)]
pub enum Listen {
    Address { interface: String, port: u16 },
    Fd { fd: i32 },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct EndpointServicesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_rate_limiter: Option<RateLimiterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_rate_limiter: Option<RateLimiterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_rate_limiter: Option<RateLimiterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_log: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EndpointConfig {
    pub name: String,
    pub listen: Listen,
    pub protocol: Protocol,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub services: EndpointServicesConfig,
}

impl EndpointConfig {
    /// `http2` endpoints must have an associated `HostManager` (spec.md
    /// §6), which in practice means at least one `hostnames` entry this
    /// endpoint's `HostManager` subset can resolve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol == Protocol::Http2 && self.hostnames.is_empty() {
            return Err(ConfigError::Http2RequiresHostManager);
        }
        Ok(())
    }
}
