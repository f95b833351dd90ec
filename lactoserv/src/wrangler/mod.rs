//! Accepts raw TCP/TLS connections and hands parsed requests to whatever
//! sits above (a `NetworkEndpoint`) via [`RequestSink`] (spec.md §2
//! "ProtocolWrangler", §4.4 "Wrangler contract").

mod listen;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use pin_project_lite::pin_project;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::component::{Component, ComponentBase, ComponentError, Context, LifecycleState};
use crate::config::{EndpointConfig, Protocol};
use crate::error::ResourceError;
use crate::host_manager::HostManager;
use crate::rate_limit::{RateLimitService, ShapedStream};

/// What a `ProtocolWrangler` hands a fully framed request to. Kept as a
/// trait rather than a direct dependency on `NetworkEndpoint` so the two
/// modules don't need to know about each other's internals — the
/// wrangler only needs somewhere to send `(request, respond)` pairs
/// (spec.md §4.4).
pub trait RequestSink: Send + Sync {
    fn handle<'a>(&'a self, request: hyper::Request<Incoming>) -> BoxFuture<'a, hyper::Response<Full<Bytes>>>;
}

/// State shared between `ProtocolWrangler::start` and the background
/// accept-loop task it spawns. Split out from `ProtocolWrangler` itself
/// so the task can hold an `Arc` to it rather than a borrow tied to the
/// `start` call's lifetime.
struct Inner {
    config: EndpointConfig,
    sink: Arc<dyn RequestSink>,
    host_manager: Option<Arc<HostManager>>,
    connection_rate_limiter: Option<Arc<RateLimitService>>,
    data_rate_limiter: Option<Arc<RateLimitService>>,
    shutdown: CancellationToken,
    grace_window: std::time::Duration,
    local_addr: std::sync::OnceLock<std::net::SocketAddr>,
}

/// Owns one listening socket, an optional TLS configuration, and the
/// upper HTTP engine (`hyper-util`'s auto H1/H2 builder). Emits parsed
/// requests to its [`RequestSink`] and enforces connection/data rate
/// limits before the request ever reaches it (spec.md §4.4).
pub struct ProtocolWrangler {
    base: ComponentBase,
    inner: Arc<Inner>,
    accept_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ProtocolWrangler {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: EndpointConfig,
        sink: Arc<dyn RequestSink>,
        host_manager: Option<Arc<HostManager>>,
        connection_rate_limiter: Option<Arc<RateLimitService>>,
        data_rate_limiter: Option<Arc<RateLimitService>>,
        grace_window: std::time::Duration,
    ) -> Self {
        Self {
            base: ComponentBase::new(name),
            inner: Arc::new(Inner {
                config,
                sink,
                host_manager,
                connection_rate_limiter,
                data_rate_limiter,
                shutdown: CancellationToken::new(),
                grace_window,
                local_addr: std::sync::OnceLock::new(),
            }),
            accept_task: std::sync::Mutex::new(None),
        }
    }

    /// The address actually bound once `start` has completed — useful
    /// when `listen.port` was `0` and the kernel picked an ephemeral
    /// port (tests, socket-activation diagnostics).
    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.local_addr.get().copied()
    }
}

fn build_tls_config(inner: &Inner) -> Result<Option<Arc<ServerConfig>>, ResourceError> {
    if !inner.config.protocol.requires_tls() {
        return Ok(None);
    }
    let resolver = inner
        .host_manager
        .clone()
        .ok_or_else(|| ResourceError::TlsHandshake("no HostManager configured for a TLS endpoint".to_string()))?;
    let mut server_config =
        ServerConfig::builder().with_no_client_auth().with_cert_resolver(resolver as Arc<dyn rustls::server::ResolvesServerCert>);
    if inner.config.protocol == Protocol::Http2 {
        server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    }
    Ok(Some(Arc::new(server_config)))
}

async fn run_accept_loop(inner: Arc<Inner>, listener: tokio::net::TcpListener) -> Result<(), ResourceError> {
    let tls_config = build_tls_config(&inner)?;
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let Ok((stream, peer_addr)) = accepted else { continue };
                if let Some(limiter) = &inner.connection_rate_limiter
                    && !limiter.admit(&inner.shutdown).await
                {
                    tracing::trace!(%peer_addr, "connection rejected by ConnectionRateLimiter");
                    continue;
                }
                let span = tracing::info_span!("connection", %peer_addr, protocol = %inner.config.protocol);
                let inner = Arc::clone(&inner);
                let watched = graceful
                    .watch(Box::pin(async move { serve_connection(stream, inner).await }).instrument(span.clone()));
                tokio::spawn(watched.in_current_span());
            }
        }
    }

    // Grace window for in-flight connections to drain, then the
    // remaining ones are dropped (spec.md §4.4).
    tokio::select! {
        () = graceful.shutdown() => {}
        () = tokio::time::sleep(inner.grace_window) => {
            tracing::warn!("ProtocolWrangler stop exceeded its grace window; forcing remaining connections closed");
        }
    }
    Ok(())
}

async fn serve_connection(stream: TcpStream, inner: Arc<Inner>) {
    let sink = Arc::clone(&inner.sink);
    let service = service_fn(move |req: hyper::Request<Incoming>| {
        let sink = Arc::clone(&sink);
        async move { Ok::<_, std::convert::Infallible>(sink.handle(req).await) }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let tls_config = build_tls_config(&inner);
    let result = match tls_config {
        Ok(Some(tls_config)) => match TlsAcceptor::from(tls_config).accept(stream).await {
            Ok(tls_stream) => {
                let io = EitherIo::new(TokioIo::new(tls_stream), inner.data_rate_limiter.clone(), inner.shutdown.clone());
                builder.serve_connection_with_upgrades(io, service).await
            }
            Err(error) => {
                tracing::debug!(%error, "TLS handshake failed");
                return;
            }
        },
        Ok(None) => {
            let io = EitherIo::new(TokioIo::new(stream), inner.data_rate_limiter.clone(), inner.shutdown.clone());
            builder.serve_connection_with_upgrades(io, service).await
        }
        Err(error) => {
            tracing::error!(%error, "failed to build TLS config for accepted connection");
            return;
        }
    };
    if let Err(error) = result {
        tracing::debug!(%error, "connection ended with error");
    }
}

pin_project! {
    /// Egress-shaped when a `DataRateLimiter` is configured, a plain
    /// passthrough otherwise — avoids allocating a limiter per connection
    /// when the endpoint has none configured.
    #[project = EitherIoProj]
    enum EitherIo<S> {
        Plain { #[pin] io: S },
        Shaped { #[pin] io: ShapedStream<S> },
    }
}

impl<S> EitherIo<S> {
    fn new(io: S, data_rate_limiter: Option<Arc<RateLimitService>>, cancel: CancellationToken) -> Self {
        match data_rate_limiter {
            Some(limiter) => Self::Shaped { io: limiter.shape_stream(io, cancel) },
            None => Self::Plain { io },
        }
    }
}

impl<S: AsyncRead> AsyncRead for EitherIo<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            EitherIoProj::Plain { io } => io.poll_read(cx, buf),
            EitherIoProj::Shaped { io } => io.poll_read(cx, buf),
        }
    }
}

impl<S: AsyncWrite> AsyncWrite for EitherIo<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            EitherIoProj::Plain { io } => io.poll_write(cx, buf),
            EitherIoProj::Shaped { io } => io.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            EitherIoProj::Plain { io } => io.poll_flush(cx),
            EitherIoProj::Shaped { io } => io.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            EitherIoProj::Plain { io } => io.poll_shutdown(cx),
            EitherIoProj::Shaped { io } => io.poll_shutdown(cx),
        }
    }
}

impl Component for ProtocolWrangler {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> LifecycleState {
        self.base.state()
    }

    fn init<'a>(&'a self, ctx: Context, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_init(ctx)?;
            self.inner.config.validate()?;
            self.base.finish_init();
            Ok(())
        })
    }

    fn start<'a>(&'a self, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_start()?;
            // Bind synchronously so a resource error (port in use, bad
            // interface) propagates to the caller per spec.md §7 ("the
            // endpoint fails to start") instead of only surfacing as a
            // log line from a detached task.
            let listener = listen::bind(&self.inner.config.listen).await?;
            if let Ok(addr) = listener.local_addr() {
                self.inner.local_addr.set(addr).ok();
            }
            let inner = Arc::clone(&self.inner);
            let logger = self.base.logger().clone();
            let handle = tokio::spawn(async move {
                if let Err(error) = run_accept_loop(inner, listener).await {
                    logger.in_scope(|| tracing::error!(%error, "ProtocolWrangler accept loop failed"));
                }
            });
            *self.accept_task.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
            self.base.finish_start();
            Ok(())
        })
    }

    fn stop<'a>(&'a self, _will_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_stop()?;
            self.inner.shutdown.cancel();
            // The accept loop races its own drain against `grace_window`
            // internally; this timeout is a backstop in case it's wedged
            // rather than just draining, so `stop` can't hang forever.
            let handle = self.accept_task.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
            if let Some(handle) = handle {
                let backstop = self.inner.grace_window + std::time::Duration::from_secs(1);
                if tokio::time::timeout(backstop, handle).await.is_err() {
                    tracing::warn!("ProtocolWrangler accept-loop task did not finish within its grace window; abandoning it");
                }
            }
            self.base.finish_stop();
            Ok(())
        })
    }
}
