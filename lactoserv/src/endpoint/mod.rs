//! `NetworkEndpoint`: owns a `ProtocolWrangler` plus the compiled mount
//! tree `hostname -> path -> application` and implements the request
//! dispatch algorithm (spec.md §4.4).

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use path_tree::{PathKey, TreePathMap};
use tokio_util::sync::CancellationToken;

use crate::access_log::AccessLogService;
use crate::application::{Application, ApplicationManager, DispatchInfo, Response};
use crate::component::{Component, ComponentBase, ComponentError, Context, LifecycleState};
use crate::config::EndpointConfig;
use crate::error::{ApiError, ConfigError};
use crate::host_manager::HostManager;
use crate::rate_limit::RateLimitService;
use crate::util::id::IdGenerator;
use crate::wrangler::{ProtocolWrangler, RequestSink};

/// One `(base, application)` binding reachable under a matched hostname,
/// compiled from a `MountConfig` once `application` names are resolved
/// against the `ApplicationManager` (spec.md §4.4, §4.6 — resolved at
/// start-time, not construction time).
struct MountedApplication {
    base: PathKey,
    application: Arc<dyn Application>,
}

/// The request-handling half of a `NetworkEndpoint`, split out so it can
/// be constructed as a plain `Arc<Dispatcher>` and handed to the
/// `ProtocolWrangler` as its `RequestSink` at the same time the owning
/// `NetworkEndpoint` is built — no self-referential `Arc` required.
struct Dispatcher {
    applications: Arc<ApplicationManager>,
    access_log: Option<Arc<AccessLogService>>,
    logger: telemetry::Logger,
    mounts: OnceLock<TreePathMap<TreePathMap<MountedApplication>>>,
    request_rate_limiter: OnceLock<Option<Arc<RateLimitService>>>,
}

impl Dispatcher {
    async fn dispatch(&self, request: &crate::http::Request) -> Response {
        let Some(mounts) = self.mounts.get() else {
            return ApiError::HostNotFound.into_http_response();
        };
        let host_key = PathKey::from_hostname(&request.pseudo().authority);
        let Some(host_match) = mounts.find_best(&host_key) else {
            return ApiError::HostNotFound.into_http_response();
        };
        let path_key = PathKey::from_uri_path(&request.pseudo().path);
        for candidate in host_match.value.find(&path_key, true) {
            let base_len = candidate.value.base.len().min(path_key.len());
            let extra = path_key.slice(base_len, path_key.len());
            let dispatch = DispatchInfo { base: candidate.value.base.clone(), extra };
            if let Some(response) = candidate.value.application.handle_request(request, &dispatch).await {
                return response;
            }
        }
        ApiError::NotFound.into_http_response()
    }

    async fn serve(&self, request: &crate::http::Request) -> Response {
        if let Some(Some(limiter)) = self.request_rate_limiter.get() {
            let cancel = CancellationToken::new();
            if !limiter.admit(&cancel).await {
                if let Some(log) = &self.access_log {
                    log.record_rejected(request.id(), "request rate limit denied", StatusCode::TOO_MANY_REQUESTS);
                }
                return ApiError::RateLimited.into_http_response();
            }
        }
        self.dispatch(request).await
    }
}

impl RequestSink for Dispatcher {
    fn handle<'a>(&'a self, request: hyper::Request<Incoming>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let (parts, body) = request.into_parts();
            let authority = parts
                .uri
                .authority()
                .map(ToString::to_string)
                .or_else(|| parts.headers.get(http::header::HOST).and_then(|v| v.to_str().ok()).map(ToString::to_string))
                .unwrap_or_default();
            // The body is not interpreted per spec.md §1 ("does not
            // interpret request bodies"); draining it here only avoids
            // leaving an unread body on the wire for keep-alive reuse.
            let _ = body.collect().await;
            let req = crate::http::Request::new(
                parts.method,
                &parts.uri,
                &authority,
                parts.headers,
                IdGenerator.next(),
                self.logger.clone(),
            );
            let response = self.serve(&req).await;
            if let Some(log) = &self.access_log {
                let bytes_written = response.body().size_hint().exact().unwrap_or(0);
                log.record(&req, response.status(), start.elapsed(), bytes_written);
            }
            response
        })
    }
}

/// Owns a `ProtocolWrangler` and routes requests it hands over to the
/// mounted applications, gating on the configured `RequestRateLimiter`
/// first (spec.md §4.4).
pub struct NetworkEndpoint {
    base: ComponentBase,
    config: EndpointConfig,
    dispatcher: Arc<Dispatcher>,
    wrangler: ProtocolWrangler,
}

impl NetworkEndpoint {
    #[must_use]
    pub fn new(
        config: EndpointConfig,
        applications: Arc<ApplicationManager>,
        access_log: Option<Arc<AccessLogService>>,
        host_manager: Option<Arc<HostManager>>,
        connection_rate_limiter: Option<Arc<RateLimitService>>,
        data_rate_limiter: Option<Arc<RateLimitService>>,
        grace_window: Duration,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            applications,
            access_log,
            logger: telemetry::Logger::root().child(&config.name),
            mounts: OnceLock::new(),
            request_rate_limiter: OnceLock::new(),
        });
        let wrangler = ProtocolWrangler::new(
            format!("{}.wrangler", config.name),
            config.clone(),
            Arc::clone(&dispatcher) as Arc<dyn RequestSink>,
            host_manager,
            connection_rate_limiter,
            data_rate_limiter,
            grace_window,
        );
        Self { base: ComponentBase::new(config.name.clone()), config, dispatcher, wrangler }
    }

    /// The address actually bound once `start` has completed — `None`
    /// before start or for an `fd`-inherited listener without a resolved
    /// `SocketAddr`.
    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.wrangler.local_addr()
    }

    fn compile_mounts(&self) -> Result<TreePathMap<TreePathMap<MountedApplication>>, ConfigError> {
        let mut hosts: TreePathMap<TreePathMap<MountedApplication>> = TreePathMap::new();
        // Group mounts by hostname key first since TreePathMap::add
        // rejects a duplicate key and several mounts can legitimately
        // share a hostname (spec.md §3: "multiple mounts may share a
        // hostnameKey").
        let mut by_host: std::collections::HashMap<String, TreePathMap<MountedApplication>> = std::collections::HashMap::new();
        for mount in &self.config.mounts {
            let application = self.dispatcher.applications.resolve(&mount.application).ok_or_else(|| ConfigError::Invalid {
                field: "mounts[].application",
                constraint: "must name a registered application",
                value: mount.application.clone(),
            })?;
            let paths = by_host.entry(mount.hostname.clone()).or_default();
            let exact_base = PathKey::from_uri_path(&mount.path);
            let wildcard_base = PathKey::new(exact_base.components().iter().map(AsRef::as_ref), true);
            // Registered twice so the mount matches both its own path
            // exactly and everything below it (a wildcard node's own
            // depth is never returned as a match — see
            // TreePathMap::find's "strictly shorter" rule).
            paths
                .add(&exact_base, MountedApplication { base: exact_base.clone(), application: Arc::clone(&application) })
                .map_err(|_| ConfigError::Invalid {
                    field: "mounts[].path",
                    constraint: "must be unique per hostname",
                    value: mount.path.clone(),
                })?;
            paths
                .add(&wildcard_base, MountedApplication { base: exact_base.clone(), application })
                .map_err(|_| ConfigError::Invalid {
                    field: "mounts[].path",
                    constraint: "must be unique per hostname",
                    value: mount.path.clone(),
                })?;
        }
        for (hostname, paths) in by_host {
            hosts.add(&PathKey::from_hostname(&hostname), paths).map_err(|_| ConfigError::Invalid {
                field: "mounts[].hostname",
                constraint: "must be unique",
                value: hostname,
            })?;
        }
        Ok(hosts)
    }
}

impl Component for NetworkEndpoint {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> LifecycleState {
        self.base.state()
    }

    fn init<'a>(&'a self, ctx: Context, is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_init(ctx.clone())?;
            self.config.validate()?;
            self.wrangler.init(ctx.child("wrangler"), is_reload).await?;
            self.base.finish_init();
            Ok(())
        })
    }

    fn start<'a>(&'a self, is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_start()?;
            // Application names are resolved against the ApplicationManager
            // here, not in `init` (spec.md §4.6: "resolved at start-time,
            // not construction time") — `init` only validates config.
            let mounts = self.compile_mounts()?;
            self.dispatcher.mounts.set(mounts).ok();
            let request_rate_limiter = match &self.config.services.request_rate_limiter {
                Some(cfg) => {
                    let limiter = Arc::new(RateLimitService::new(format!("{}.requestRateLimiter", self.config.name), cfg.clone()));
                    limiter.init(self.base.context().child("requestRateLimiter"), is_reload).await?;
                    limiter.start(is_reload).await?;
                    Some(limiter)
                }
                None => None,
            };
            self.dispatcher.request_rate_limiter.set(request_rate_limiter).ok();
            self.wrangler.start(is_reload).await?;
            self.base.finish_start();
            Ok(())
        })
    }

    fn stop<'a>(&'a self, will_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_stop()?;
            self.wrangler.stop(will_reload).await?;
            if let Some(Some(limiter)) = self.dispatcher.request_rate_limiter.get() {
                limiter.stop(will_reload).await?;
            }
            self.base.finish_stop();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Response as AppResponse;
    use crate::config::{EndpointServicesConfig, Listen, MountConfig, Protocol};

    struct Echo;

    impl Application for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn handle_request<'a>(
            &'a self,
            _request: &'a crate::http::Request,
            _dispatch: &'a DispatchInfo,
        ) -> BoxFuture<'a, Option<AppResponse>> {
            Box::pin(async move { Some(hyper::Response::new(Full::new(Bytes::from_static(b"ok")))) })
        }
    }

    fn config() -> EndpointConfig {
        EndpointConfig {
            name: "e".into(),
            listen: Listen::Address { interface: "127.0.0.1".into(), port: 0 },
            protocol: Protocol::Http,
            hostnames: vec![],
            mounts: vec![MountConfig { hostname: "example.com".into(), path: "/api".into(), application: "echo".into() }],
            services: EndpointServicesConfig::default(),
        }
    }

    fn applications() -> Arc<ApplicationManager> {
        let mut manager = ApplicationManager::new();
        manager.register(Arc::new(Echo));
        Arc::new(manager)
    }

    #[tokio::test]
    async fn dispatches_exact_and_nested_paths() {
        let endpoint = NetworkEndpoint::new(config(), applications(), None, None, None, None, Duration::from_millis(250));
        let ctx = Context::root(crate::component::RootControlContext::new());
        endpoint.init(ctx, false).await.unwrap();
        endpoint.start(false).await.unwrap();

        let mounts = endpoint.dispatcher.mounts.get().unwrap();
        let host_match = mounts.find_best(&PathKey::from_hostname("example.com")).unwrap();

        assert!(host_match.value.find_best(&PathKey::from_uri_path("/api")).is_some());
        assert!(host_match.value.find_best(&PathKey::from_uri_path("/api/widgets")).is_some());
        assert!(host_match.value.find_best(&PathKey::from_uri_path("/other")).is_none());
    }

    #[tokio::test]
    async fn dispatch_falls_through_to_404_for_unknown_host() {
        let endpoint = NetworkEndpoint::new(config(), applications(), None, None, None, None, Duration::from_millis(250));
        let ctx = Context::root(crate::component::RootControlContext::new());
        endpoint.init(ctx, false).await.unwrap();
        endpoint.start(false).await.unwrap();

        let headers = http::HeaderMap::new();
        let uri: http::Uri = "/anything".parse().unwrap();
        let request = crate::http::Request::new(
            http::Method::GET,
            &uri,
            "nowhere.example.com",
            headers,
            IdGenerator.next(),
            telemetry::Logger::root(),
        );
        let response = endpoint.dispatcher.serve(&request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
