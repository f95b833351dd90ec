//! `WebappRoot`: the top-level composition spec.md §4.6 describes — four
//! child managers (hosts, services, applications, endpoints) started and
//! stopped in strict layer order, with grace windows between stop layers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use meltdown::Token;

use crate::access_log::AccessLogService;
use crate::application::{Application, ApplicationManager};
use crate::component::{Component, Context, RootControlContext};
use crate::config::{ApplicationConfig, WebappRootConfig};
use crate::endpoint::NetworkEndpoint;
use crate::error::{ConfigError, RuntimeError};
use crate::host_manager::HostManager;
use crate::rate_limit::RateLimitService;

/// Builds a concrete [`Application`] from an `ApplicationConfig`. Concrete
/// application kinds (static-file server, simple response, redirector)
/// are external collaborators (spec.md §1); this is the seam a binary
/// plugs them in through.
pub trait ApplicationFactory: Send + Sync {
    fn build(&self, config: &ApplicationConfig) -> Result<Arc<dyn Application>, ConfigError>;
}

struct EndpointBundle {
    endpoint: Arc<NetworkEndpoint>,
    services: Vec<Arc<RateLimitService>>,
}

/// Top-level composition. Not itself a [`Component`] — it *is* the root
/// of the component tree, driven by the process's shutdown signal rather
/// than by a parent's `init`/`start`/`stop` — but exposes the same
/// `init`/`start`/`stop` shape so `main` can drive it directly, and
/// implements `meltdown::Service` so it can run inside the binary's
/// `Meltdown` loop (spec.md §A.1).
pub struct WebappRoot {
    config: WebappRootConfig,
    application_factory: Arc<dyn ApplicationFactory>,
    root_context: Arc<RootControlContext>,
    host_manager: Arc<HostManager>,
    host_subsets: std::sync::Mutex<Vec<Arc<HostManager>>>,
    access_log: Option<Arc<AccessLogService>>,
    applications: std::sync::OnceLock<Arc<ApplicationManager>>,
    endpoints: std::sync::OnceLock<Vec<EndpointBundle>>,
}

impl WebappRoot {
    #[must_use]
    pub fn new(config: WebappRootConfig, application_factory: Arc<dyn ApplicationFactory>) -> Self {
        let host_manager = Arc::new(HostManager::new("hosts", config.hosts.clone()));
        Self {
            config,
            application_factory,
            root_context: RootControlContext::new(),
            host_manager,
            host_subsets: std::sync::Mutex::new(Vec::new()),
            access_log: None,
            applications: std::sync::OnceLock::new(),
            endpoints: std::sync::OnceLock::new(),
        }
    }

    /// `init` then `start`, in that order, matching spec.md §4.5's
    /// invariant that `init` always precedes the first `start`.
    pub async fn init_and_start(&mut self, is_reload: bool) -> Result<(), RuntimeError> {
        self.init(is_reload).await?;
        self.start(is_reload).await?;
        Ok(())
    }

    /// The address a named endpoint actually bound to once `start` has
    /// completed. Mainly useful for tests driving a real socket against an
    /// endpoint configured with an ephemeral `listen.port: 0`.
    #[must_use]
    pub fn endpoint_local_addr(&self, name: &str) -> Option<std::net::SocketAddr> {
        self.endpoints.get()?.iter().find(|b| b.endpoint.name() == name)?.endpoint.local_addr()
    }

    async fn init(&mut self, is_reload: bool) -> Result<(), RuntimeError> {
        self.config.validate()?;
        let ctx = Context::root(Arc::clone(&self.root_context));
        let services_ctx = ctx.child("services");
        let endpoints_ctx = ctx.child("endpoints");

        self.host_manager.init(ctx.child("hosts"), is_reload).await?;

        let access_log = if self.config.endpoints.iter().any(|e| e.services.access_log == Some(true)) {
            let service = Arc::new(AccessLogService::new("accessLog"));
            service.init(services_ctx.child("accessLog"), is_reload).await?;
            Some(service)
        } else {
            None
        };
        self.access_log = access_log;

        let mut applications = ApplicationManager::new();
        for app_config in &self.config.applications {
            let app = self.application_factory.build(app_config)?;
            applications.register(app);
        }
        let applications = Arc::new(applications);
        self.applications.set(Arc::clone(&applications)).ok();

        let mut bundles = Vec::with_capacity(self.config.endpoints.len());
        for endpoint_config in &self.config.endpoints {
            let endpoint_services_ctx = services_ctx.child(&endpoint_config.name);
            let mut services = Vec::new();
            let connection_rate_limiter = match &endpoint_config.services.connection_rate_limiter {
                Some(cfg) => {
                    let service =
                        Arc::new(RateLimitService::new(format!("{}.connectionRateLimiter", endpoint_config.name), *cfg));
                    service.init(endpoint_services_ctx.child("connectionRateLimiter"), is_reload).await?;
                    services.push(Arc::clone(&service));
                    Some(service)
                }
                None => None,
            };
            let data_rate_limiter = match &endpoint_config.services.data_rate_limiter {
                Some(cfg) => {
                    let service = Arc::new(RateLimitService::new(format!("{}.dataRateLimiter", endpoint_config.name), *cfg));
                    service.init(endpoint_services_ctx.child("dataRateLimiter"), is_reload).await?;
                    services.push(Arc::clone(&service));
                    Some(service)
                }
                None => None,
            };

            // Each TLS-capable endpoint gets its own `HostManager` subset,
            // scoped to the hostnames it actually declares (spec.md §4.3
            // `makeSubset`), rather than sharing the root manager's full
            // host list. An endpoint with no explicit `hostnames` keeps
            // the full root set (nothing to narrow by). Subsets are
            // `init`ed here but `start`ed alongside the root host manager
            // in the "hosts" layer (§4.6), not here.
            let host_manager = if endpoint_config.protocol.requires_tls() {
                if endpoint_config.hostnames.is_empty() {
                    Some(Arc::clone(&self.host_manager))
                } else {
                    let subset = Arc::new(
                        self.host_manager
                            .make_subset(format!("hosts.{}", endpoint_config.name), &endpoint_config.hostnames),
                    );
                    subset.init(ctx.child("hosts").child(&endpoint_config.name), is_reload).await?;
                    self.host_subsets.lock().expect("host_subsets mutex poisoned").push(Arc::clone(&subset));
                    Some(subset)
                }
            } else {
                None
            };

            let endpoint = Arc::new(NetworkEndpoint::new(
                endpoint_config.clone(),
                Arc::clone(&applications),
                if endpoint_config.services.access_log == Some(true) { self.access_log.clone() } else { None },
                host_manager,
                connection_rate_limiter,
                data_rate_limiter,
                self.config.stop_grace.endpoint_stop_grace_period,
            ));
            endpoint.init(endpoints_ctx.child(&endpoint_config.name), is_reload).await?;
            bundles.push(EndpointBundle { endpoint, services });
        }
        self.endpoints.set(bundles).ok();

        Ok(())
    }

    /// Start order: hosts → services → applications → endpoints, each
    /// layer started in parallel (spec.md §4.6). The "applications" layer
    /// has no asynchronous work of its own here (registration happens at
    /// `init`), so it's a no-op pause between the services and endpoints
    /// layers rather than a real parallel `start` fan-out.
    async fn start(&self, is_reload: bool) -> Result<(), RuntimeError> {
        self.host_manager.start(is_reload).await?;
        let subsets: Vec<Arc<HostManager>> = self.host_subsets.lock().expect("host_subsets mutex poisoned").clone();
        futures::future::try_join_all(subsets.iter().map(|h| h.start(is_reload))).await?;

        if let Some(access_log) = &self.access_log {
            access_log.start(is_reload).await?;
        }
        let endpoints = self.endpoints.get().expect("start called before init");
        let service_starts = endpoints.iter().flat_map(|b| b.services.iter()).map(|s| s.start(is_reload));
        futures::future::try_join_all(service_starts).await?;

        let endpoint_starts = endpoints.iter().map(|b| b.endpoint.start(is_reload));
        futures::future::try_join_all(endpoint_starts).await?;

        Ok(())
    }

    /// Stop order: endpoints → (grace) → applications → (grace) →
    /// services → hosts (spec.md §4.6). "Applications" has nothing to
    /// stop in this core (concrete application lifecycles are an
    /// external concern), so its slot is just the grace pause.
    pub async fn stop(&self, will_reload: bool) -> Result<(), RuntimeError> {
        let endpoints = self.endpoints.get().expect("stop called before init");

        let endpoint_stops = endpoints.iter().map(|b| b.endpoint.stop(will_reload));
        futures::future::try_join_all(endpoint_stops).await?;

        tokio::time::sleep(self.config.stop_grace.endpoint_stop_grace_period).await;
        tokio::time::sleep(self.config.stop_grace.application_stop_grace_period).await;

        let service_stops = endpoints.iter().flat_map(|b| b.services.iter()).map(|s| s.stop(will_reload));
        futures::future::try_join_all(service_stops).await?;
        if let Some(access_log) = &self.access_log {
            access_log.stop(will_reload).await?;
        }

        let subsets: Vec<Arc<HostManager>> = self.host_subsets.lock().expect("host_subsets mutex poisoned").clone();
        futures::future::try_join_all(subsets.iter().map(|h| h.stop(will_reload))).await?;
        self.host_manager.stop(will_reload).await?;
        Ok(())
    }
}

impl meltdown::Service for WebappRoot {
    type Future = BoxFuture<'static, Result<(), RuntimeError>>;

    fn run(self, token: Token) -> Self::Future {
        Box::pin(async move {
            token.await;
            self.stop(false).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointServicesConfig, Listen, MountConfig, Protocol};
    use futures::future::BoxFuture as BF;
    use http_body_util::Full;
    use hyper::body::Bytes;

    struct Echo;

    impl Application for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn handle_request<'a>(
            &'a self,
            _request: &'a crate::http::Request,
            _dispatch: &'a crate::application::DispatchInfo,
        ) -> BF<'a, Option<crate::application::Response>> {
            Box::pin(async move { Some(hyper::Response::new(Full::new(Bytes::from_static(b"ok")))) })
        }
    }

    struct EchoFactory;

    impl ApplicationFactory for EchoFactory {
        fn build(&self, _config: &ApplicationConfig) -> Result<Arc<dyn Application>, ConfigError> {
            Ok(Arc::new(Echo))
        }
    }

    fn config() -> WebappRootConfig {
        WebappRootConfig {
            applications: vec![ApplicationConfig { name: "echo".into(), kind: "echo".into(), params: serde_json::Value::Null }],
            endpoints: vec![crate::config::EndpointConfig {
                name: "main".into(),
                listen: Listen::Address { interface: "127.0.0.1".into(), port: 0 },
                protocol: Protocol::Http,
                hostnames: vec![],
                mounts: vec![MountConfig { hostname: "example.com".into(), path: "/".into(), application: "echo".into() }],
                services: EndpointServicesConfig::default(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_and_stops_the_full_tree() {
        let mut root = WebappRoot::new(config(), Arc::new(EchoFactory));
        root.init_and_start(false).await.unwrap();
        root.stop(false).await.unwrap();
    }
}
