//! Wraps the shared [`token_bucket::TokenBucket`] primitive as the three
//! roles spec.md §2/§4.4 need: a connection gate, a request gate, and a
//! stream byte-shaper — all three are "tokens = <connections | requests |
//! bytes>" views over the same state machine (spec.md §4.1).

mod byte_shaper;

pub use byte_shaper::{ShapedStream, ShapedWriter};

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use token_bucket::TokenBucket;

use crate::component::{Component, ComponentBase, ComponentError, Context, LifecycleState};
use crate::config::RateLimiterConfig;

/// A single configured rate limiter, usable as a connection gate, a
/// request gate (both are "grant one token"), or as the backing bucket
/// for a [`ShapedWriter`] (byte-rate shaping).
pub struct RateLimitService {
    base: ComponentBase,
    config: RateLimiterConfig,
    bucket: std::sync::OnceLock<Arc<TokenBucket>>,
}

impl RateLimitService {
    #[must_use]
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self { base: ComponentBase::new(name), config, bucket: std::sync::OnceLock::new() }
    }

    fn bucket(&self) -> &Arc<TokenBucket> {
        self.bucket.get().expect("RateLimitService used before init")
    }

    /// Requests one token — the connection/request admission check
    /// (spec.md §4.4 "tokens=1 per request"; the analogous connection
    /// check in `ProtocolWrangler`'s accept loop is the same call with a
    /// different caller).
    pub async fn admit(&self, cancel: &CancellationToken) -> bool {
        self.bucket().request_grant(1.0, cancel).await.granted
    }

    /// Wraps `writer` so every write is metered through this limiter's
    /// bucket (spec.md §4.1 "Byte-rate limiters use the same state
    /// machine with tokens=bytes").
    #[must_use]
    pub fn shape<W>(&self, writer: W, cancel: CancellationToken) -> ShapedWriter<W> {
        ShapedWriter::new(writer, Arc::clone(self.bucket()), cancel)
    }

    /// Wraps a full-duplex connection (e.g. a `TcpStream`) so its egress
    /// is metered, leaving ingress untouched.
    #[must_use]
    pub fn shape_stream<S>(&self, io: S, cancel: CancellationToken) -> ShapedStream<S> {
        ShapedStream::new(io, Arc::clone(self.bucket()), cancel)
    }

    /// Stops admitting new work and unblocks every queued waiter with a
    /// denial (spec.md §4.1 `denyAllRequests`), used when the component
    /// owning this limiter is stopping.
    pub async fn deny_all(&self) {
        self.bucket().deny_all_requests().await;
    }
}

impl Component for RateLimitService {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> LifecycleState {
        self.base.state()
    }

    fn init<'a>(&'a self, ctx: Context, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_init(ctx)?;
            self.bucket.set(Arc::new(TokenBucket::new(self.config.to_bucket_config()))).ok();
            self.base.finish_init();
            Ok(())
        })
    }

    fn start<'a>(&'a self, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_start()?;
            self.base.finish_start();
            Ok(())
        })
    }

    fn stop<'a>(&'a self, _will_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_stop()?;
            self.deny_all().await;
            self.base.finish_stop();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::RootControlContext;
    use crate::config::RateLimitTimeUnit;

    fn config() -> RateLimiterConfig {
        RateLimiterConfig {
            flow_rate: 1.0,
            max_burst: 1.0,
            max_queue: 0.0,
            max_queue_grant: None,
            time_unit: RateLimitTimeUnit::Second,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_within_burst_then_denies() {
        let service = RateLimitService::new("limiter", config());
        service.init(Context::root(RootControlContext::new()), false).await.unwrap();
        service.start(false).await.unwrap();

        let cancel = CancellationToken::new();
        assert!(service.admit(&cancel).await);
        assert!(!service.admit(&cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_denies_queued_waiters() {
        let queueable = RateLimiterConfig { max_queue: 10.0, ..config() };
        let service = Arc::new(RateLimitService::new("limiter", queueable));
        service.init(Context::root(RootControlContext::new()), false).await.unwrap();
        service.start(false).await.unwrap();

        let cancel = CancellationToken::new();
        assert!(service.admit(&cancel).await);

        let waiter_service = Arc::clone(&service);
        let waiter = tokio::spawn(async move { waiter_service.bucket().request_grant(1.0, &CancellationToken::new()).await });
        tokio::task::yield_now().await;

        Component::stop(service.as_ref(), false).await.unwrap();
        assert!(!waiter.await.unwrap().granted);
    }
}
