/// The unit a configured rate is expressed in. `TokenBucket` itself only
/// ever deals in tokens-per-second; this exists so the config layer can
/// accept the vocabulary operators actually write (`tokensPerDay`,
/// `tokensPerMinute`, ...) and convert once at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Day,
    Hour,
    Minute,
    Second,
    Msec,
}

impl TimeUnit {
    #[must_use]
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            Self::Day => 86400.0,
            Self::Hour => 3600.0,
            Self::Minute => 60.0,
            Self::Second => 1.0,
            Self::Msec => 0.001,
        }
    }

    /// Converts a rate given in `tokens` per `self` into tokens per second.
    #[must_use]
    pub fn to_per_second(self, tokens: f64) -> f64 {
        tokens / self.seconds_per_unit()
    }
}

/// Construction parameters for a [`crate::TokenBucket`], already resolved
/// to tokens-per-second and an absolute token count (see [`TimeUnit`] for
/// converting from a configured per-day/per-hour/... rate).
#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    /// Steady-state fill rate, in tokens per second.
    pub flow_rate_per_sec: f64,
    /// Ceiling on `available_tokens`; also the largest grant a single
    /// synchronous request can receive.
    pub max_burst_size: f64,
    /// Ceiling on the sum of `requested` across all queued waiters.
    pub max_queue_size: f64,
    /// Caps the size of any individual grant made out of the queue path
    /// (synchronous or suspended). `None` means no cap beyond what the
    /// caller asked for.
    pub max_queue_grant_size: Option<f64>,
}
