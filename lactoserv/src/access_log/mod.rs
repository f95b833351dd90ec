//! Emits one structured log record per request/response pair. The record
//! shape itself is not wire-observable — a human-readable formatter is a
//! downstream concern — so this just hands a `tracing` event the fields
//! a formatter needs.

use futures::future::BoxFuture;
use http::StatusCode;

use crate::component::{Component, ComponentBase, ComponentError, Context, LifecycleState};
use crate::http::Request;
use crate::util::id::RequestId;

pub struct AccessLogService {
    base: ComponentBase,
}

impl AccessLogService {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { base: ComponentBase::new(name) }
    }

    /// Records one request/response pair. Called by `NetworkEndpoint`
    /// after dispatch completes, regardless of outcome (spec.md §2 data
    /// flow: "AccessLogService records the pair").
    pub fn record(&self, request: &Request, status: StatusCode, elapsed: std::time::Duration, bytes_written: u64) {
        self.base.logger().in_scope(|| {
            tracing::info!(
                request_id = %request.id(),
                method = %request.method(),
                path = %request.pseudo().path,
                authority = %request.pseudo().authority,
                status = status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                bytes_written,
                "request handled"
            );
        });
    }

    /// Records a request that never reached dispatch (e.g. rate-limited
    /// or no matching host), so access logs still account for it.
    pub fn record_rejected(&self, request_id: RequestId, reason: &str, status: StatusCode) {
        self.base.logger().in_scope(|| {
            tracing::info!(%request_id, reason, status = status.as_u16(), "request rejected before dispatch");
        });
    }
}

impl Component for AccessLogService {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn state(&self) -> LifecycleState {
        self.base.state()
    }

    fn init<'a>(&'a self, ctx: Context, _is_reload: bool) -> BoxFuture<'a, Result<(), ComponentError>> {
        Box::pin(async move {
            self.base.begin_init(ctx)?;
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
            self.base.finish_stop();
            Ok(())
        })
    }
}
