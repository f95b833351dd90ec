//! Maps hostname to TLS context via a wildcard-aware lookup and supplies
//! the SNI callback the TLS machinery consults per handshake (spec.md
//! §4.3).

mod cert;

pub use cert::{build_certified_key, generate_self_signed, parse_certificate_chain, parse_private_key};

use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use path_tree::{PathKey, TreePathMap};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tokio::sync::OnceCell;

use crate::component::{Component, ComponentBase, ComponentError, Context, LifecycleState};
use crate::config::HostConfig;
use crate::error::ResourceError;

/// One configured host's TLS material. Generation of a self-signed pair
/// is asynchronous (spec.md §4.3), so `secure_context` is an `OnceCell`
/// any number of concurrent `sni_callback` hits can await without
/// duplicating the (expensive) key generation.
struct HostItem {
    hostnames: Vec<String>,
    config: HostConfig,
    secure_context: OnceCell<Arc<CertifiedKey>>,
}

impl HostItem {
    fn new(config: HostConfig) -> Self {
        Self { hostnames: config.hostnames.clone(), config, secure_context: OnceCell::new() }
    }

    async fn resolve(&self) -> Result<Arc<CertifiedKey>, ResourceError> {
        self.secure_context
            .get_or_try_init(|| async {
                if self.config.self_signed {
                    cert::generate_self_signed(self.hostnames.clone()).await
                } else {
                    let cert_pem = self.config.certificate.as_deref().ok_or_else(|| {
                        ResourceError::InvalidCertificate("no certificate configured".to_string())
                    })?;
                    let key_pem = self.config.private_key.as_deref().ok_or_else(|| {
                        ResourceError::InvalidPrivateKey("no private key configured".to_string())
                    })?;
                    cert::build_certified_key(cert_pem, key_pem)
                }
            })
            .await
            .cloned()
    }
}

/// Owns a `TreePathMap<HostItem>` keyed by hostname and doubles as a
/// `rustls::server::ResolvesServerCert`, so it can be handed directly to
/// a `ServerConfig` as the SNI resolver (spec.md §4.3 "sniCallback").
pub struct HostManager {
    base: ComponentBase,
    host_configs: Vec<HostConfig>,
    hosts: OnceLock<TreePathMap<Arc<HostItem>>>,
    all_items: OnceLock<Vec<Arc<HostItem>>>,
}

impl HostManager {
    #[must_use]
    pub fn new(name: impl Into<String>, host_configs: Vec<HostConfig>) -> Self {
        Self {
            base: ComponentBase::new(name),
            host_configs,
            hosts: OnceLock::new(),
            all_items: OnceLock::new(),
        }
    }

    fn hosts(&self) -> &TreePathMap<Arc<HostItem>> {
        self.hosts.get().expect("HostManager used before init")
    }

    /// Parses `server_name` into a reverse hostname `PathKey`, looks it up
    /// against the tree, and resolves (possibly generating) its TLS
    /// context (spec.md §4.3). Safe to call concurrently — every caller
    /// during warm-up awaits the same in-flight generation via `OnceCell`.
    pub async fn secure_context_for(&self, server_name: &str) -> Result<Arc<CertifiedKey>, ResourceError> {
        let key = PathKey::from_hostname(server_name);
        let item = self
            .hosts()
            .find_best(&key)
            .map(|m| Arc::clone(m.value))
            .ok_or_else(|| ResourceError::UnknownHost(server_name.to_string()))?;
        item.resolve().await
    }

    /// Returns a new, uninitialized `HostManager` restricted to the
    /// configured hosts whose hostname patterns intersect `names` (spec.md
    /// §4.3 `makeSubset`). Used by `NetworkEndpoint` to scope SNI
    /// resolution to the hostnames it actually mounts, instead of sharing
    /// the root `HostManager`'s full host list. The returned manager is a
    /// fresh component (own `init`/`start`) over a filtered copy of
    /// `host_configs`; hosts with no hostname left after filtering are
    /// dropped entirely.
    #[must_use]
    pub fn make_subset(&self, name: impl Into<String>, names: &[String]) -> HostManager {
        let host_configs = self
            .host_configs
            .iter()
            .filter_map(|config| {
                let hostnames: Vec<String> =
                    config.hostnames.iter().filter(|hostname| names.iter().any(|n| n == *hostname)).cloned().collect();
                if hostnames.is_empty() { None } else { Some(HostConfig { hostnames, ..config.clone() }) }
            })
            .collect();
        HostManager::new(name, host_configs)
    }
}

impl ResolvesServerCert for HostManager {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name()?;
        let key = PathKey::from_hostname(server_name);
        // Lookups after warm-up are synchronous (spec.md §5); a cold
        // (not-yet-generated) self-signed host simply fails the
        // handshake rather than blocking it, matching
        // `ResolvesServerCert`'s synchronous contract. `start` eagerly
        // resolves every `HostItem` once so this path is warm by the
        // time a listener accepts its first connection.
        self.hosts().find_best(&key).and_then(|m| m.value.secure_context.get().cloned())
    }
}

impl Component for HostManager {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> LifecycleState {
        self.base.state()
    }

    fn init<'a>(&'a self, ctx: Context, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_init(ctx)?;
            let mut tree = TreePathMap::new();
            let mut items = Vec::with_capacity(self.host_configs.len());
            for config in &self.host_configs {
                config.validate()?;
                let item = Arc::new(HostItem::new(config.clone()));
                for hostname in &item.hostnames {
                    tree.add(&PathKey::from_hostname(hostname), Arc::clone(&item))
                        .map_err(|_| crate::error::ConfigError::Invalid {
                            field: "hostnames",
                            constraint: "unique across all configured hosts",
                            value: hostname.clone(),
                        })?;
                }
                items.push(item);
            }
            self.hosts.set(tree).ok();
            self.all_items.set(items).ok();
            self.base.finish_init();
            Ok(())
        })
    }

    fn start<'a>(&'a self, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_start()?;
            // Eagerly resolve every host so `ResolvesServerCert::resolve`
            // never has to observe a cold `OnceCell` in steady state.
            for item in self.all_items.get().into_iter().flatten() {
                item.resolve().await?;
            }
            self.base.finish_start();
            Ok(())
        })
    }

    fn stop<'a>(&'a self, _will_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_stop()?;
            self.base.finish_stop();
            Ok(())
        })
    }
}
