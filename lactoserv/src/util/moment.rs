use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

/// A wall-clock instant, truncated to second resolution for HTTP date
/// comparisons (`Last-Modified`, `If-Modified-Since`, `If-Unmodified-Since`
/// are all second-granular per RFC 9110). Distinct from
/// [`tokio::time::Instant`], which `TokenBucket` uses for monotonic timing
/// — this type is strictly for moments that need to round-trip through an
/// HTTP date header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Moment(DateTime<Utc>);

impl Moment {
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt))
    }

    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_datetime(DateTime::from(time))
    }

    /// Parses an RFC 1123 HTTP date header value (`Last-Modified`,
    /// `If-Modified-Since`, `If-Unmodified-Since`).
    pub fn parse_http_date(value: &str) -> Result<Self, httpdate::Error> {
        let system_time = httpdate::parse_http_date(value)?;
        Ok(Self::from_system_time(system_time))
    }

    #[must_use]
    pub fn to_http_date(self) -> String {
        httpdate::fmt_http_date(SystemTime::from(self.0))
    }

    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| self.0.checked_add_signed(d))
            .map(Self::from_datetime)
    }
}
