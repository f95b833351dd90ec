use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::TokenBucketConfig;

/// The outcome of a [`TokenBucket::request_grant`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub granted: bool,
    /// Tokens actually granted. `0.0` when `granted` is `false`.
    pub grant_size: f64,
    /// How long the caller waited in the suspend queue. `Duration::ZERO`
    /// for a synchronous grant or a synchronous denial.
    pub wait_time: Duration,
}

impl Grant {
    const fn denied() -> Self {
        Self {
            granted: false,
            grant_size: 0.0,
            wait_time: Duration::ZERO,
        }
    }
}

static NEXT_WAITER_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

struct Waiter {
    id: u64,
    requested: f64,
    enqueued_at: Instant,
    reply: oneshot::Sender<Grant>,
}

struct Inner {
    config: TokenBucketConfig,
    available_tokens: f64,
    last_top_up: Instant,
    waiters: VecDeque<Waiter>,
    queued_tokens: f64,
    deny_all: bool,
}

impl Inner {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_top_up).as_secs_f64();
        self.last_top_up = now;
        self.available_tokens =
            (self.available_tokens + elapsed * self.config.flow_rate_per_sec).min(self.config.max_burst_size);
    }

    /// Pops and grants every queued waiter the current `available_tokens`
    /// can satisfy, in FIFO order. Must run after `refill`.
    fn serve_queue(&mut self) {
        while let Some(front) = self.waiters.front() {
            if self.available_tokens < front.requested {
                break;
            }
            let waiter = self.waiters.pop_front().expect("front just checked");
            self.queued_tokens -= waiter.requested;
            self.available_tokens -= waiter.requested;
            let _ = waiter.reply.send(Grant {
                granted: true,
                grant_size: waiter.requested,
                wait_time: waiter.enqueued_at.elapsed(),
            });
        }
    }

    /// Duration until the head of the queue, if any, will have enough
    /// tokens available. `None` means the queue is empty.
    fn time_until_head_ready(&self) -> Option<Duration> {
        let front = self.waiters.front()?;
        let deficit = front.requested - self.available_tokens;
        if deficit <= 0.0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::from_secs_f64(deficit / self.config.flow_rate_per_sec))
    }

    fn effective_grant_cap(&self, requested: f64) -> f64 {
        self.config.max_queue_grant_size.unwrap_or(requested).min(requested)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
}

/// A continuous-fill token bucket with a bounded FIFO waiter queue.
///
/// `available_tokens` accrues at `flow_rate_per_sec`, capped at
/// `max_burst_size`. A request that cannot be satisfied immediately either
/// joins a FIFO queue (bounded by `max_queue_size` tokens) to be granted
/// once enough tokens accrue, or is denied outright if the queue has no
/// room. `deny_all_requests` latches the bucket shut: every queued waiter
/// is resolved with a denial and every subsequent call is denied without
/// consulting `available_tokens`.
pub struct TokenBucket {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(config: TokenBucketConfig) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                config,
                available_tokens: config.max_burst_size,
                last_top_up: Instant::now(),
                waiters: VecDeque::new(),
                queued_tokens: 0.0,
                deny_all: false,
            }),
            notify: Notify::new(),
        });
        let pump = tokio::spawn(Self::pump_loop(shared.clone()));
        Self { shared, pump }
    }

    /// Requests `tokens`. Resolves synchronously with `wait_time: 0` if the
    /// bucket can grant immediately (queue empty, enough available
    /// tokens); otherwise joins the FIFO queue and suspends until granted,
    /// denied (queue overflow or `deny_all_requests`), or `cancel` fires.
    pub async fn request_grant(&self, tokens: f64, cancel: &CancellationToken) -> Grant {
        let (id, receiver) = {
            let mut inner = self.shared.inner.lock().await;
            inner.refill();

            if inner.deny_all {
                return Grant::denied();
            }

            // The queue is served strictly in order: a request arriving
            // while anyone is already queued must queue too, even if it
            // could otherwise be satisfied synchronously, so a caller
            // asking for little can't cut ahead of one asking for a lot.
            if inner.waiters.is_empty() {
                let grant_size = inner.effective_grant_cap(tokens);
                if inner.available_tokens >= grant_size {
                    inner.available_tokens -= grant_size;
                    return Grant {
                        granted: true,
                        grant_size,
                        wait_time: Duration::ZERO,
                    };
                }
            }

            let grant_size = inner.effective_grant_cap(tokens);
            if inner.queued_tokens + grant_size > inner.config.max_queue_size {
                tracing::trace!(requested = tokens, grant_size, "token bucket queue full, denying");
                return Grant::denied();
            }

            let (reply, receiver) = oneshot::channel();
            let id = NEXT_WAITER_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            inner.waiters.push_back(Waiter {
                id,
                requested: grant_size,
                enqueued_at: Instant::now(),
                reply,
            });
            inner.queued_tokens += grant_size;
            self.shared.notify.notify_one();
            tracing::trace!(waiter_id = id, grant_size, queue_depth = inner.waiters.len(), "queued for token grant");
            (id, receiver)
        };

        tokio::select! {
            result = receiver => result.unwrap_or_else(|_| Grant::denied()),
            () = cancel.cancelled() => {
                self.remove_waiter(id).await;
                Grant::denied()
            }
        }
    }

    async fn remove_waiter(&self, id: u64) {
        let mut inner = self.shared.inner.lock().await;
        if let Some(pos) = inner.waiters.iter().position(|w| w.id == id) {
            let waiter = inner.waiters.remove(pos).expect("position just found");
            inner.queued_tokens -= waiter.requested;
            let _ = waiter.reply.send(Grant::denied());
        }
    }

    /// Latches the bucket shut: resolves every queued waiter with a
    /// denial and marks all future `request_grant` calls denied until a
    /// new `TokenBucket` is constructed. Used when a component is told to
    /// stop accepting new work (e.g. during shutdown drain).
    pub async fn deny_all_requests(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.deny_all = true;
        let rejected = inner.waiters.len();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.reply.send(Grant::denied());
        }
        inner.queued_tokens = 0.0;
        self.shared.notify.notify_one();
        tracing::debug!(rejected, "token bucket latched shut");
    }

    async fn pump_loop(shared: Arc<Shared>) {
        loop {
            let wait = {
                let mut inner = shared.inner.lock().await;
                inner.refill();
                inner.serve_queue();
                inner.time_until_head_ready()
            };
            match wait {
                None => shared.notify.notified().await,
                Some(duration) => {
                    tokio::select! {
                        () = tokio::time::sleep(duration) => {},
                        () = shared.notify.notified() => {},
                    }
                }
            }
        }
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
