use serde::{Deserialize, Serialize};
use token_bucket::{TimeUnit, TokenBucketConfig};

/// The wire vocabulary for a `TokenBucket` (spec.md §6 "RateLimiter").
/// Converted to `token_bucket::TokenBucketConfig` (tokens-per-second) at
/// component `init`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RateLimiterConfig {
    pub flow_rate: f64,
    pub max_burst: f64,
    pub max_queue: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_grant: Option<f64>,
    pub time_unit: RateLimitTimeUnit,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RateLimitTimeUnit {
    Day,
    Hour,
    Minute,
    Second,
    Msec,
}

impl From<RateLimitTimeUnit> for TimeUnit {
    fn from(value: RateLimitTimeUnit) -> Self {
        match value {
            RateLimitTimeUnit::Day => Self::Day,
            RateLimitTimeUnit::Hour => Self::Hour,
            RateLimitTimeUnit::Minute => Self::Minute,
            RateLimitTimeUnit::Second => Self::Second,
            RateLimitTimeUnit::Msec => Self::Msec,
        }
    }
}

impl RateLimiterConfig {
    #[must_use]
    pub fn to_bucket_config(self) -> TokenBucketConfig {
        let unit: TimeUnit = self.time_unit.into();
        TokenBucketConfig {
            flow_rate_per_sec: unit.to_per_second(self.flow_rate),
            max_burst_size: self.max_burst,
            max_queue_size: self.max_queue,
            max_queue_grant_size: self.max_queue_grant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_per_minute_rate_to_per_second() {
        let config = RateLimiterConfig {
            flow_rate: 60.0,
            max_burst: 10.0,
            max_queue: 0.0,
            max_queue_grant: None,
            time_unit: RateLimitTimeUnit::Minute,
        };
        assert!((config.to_bucket_config().flow_rate_per_sec - 1.0).abs() < f64::EPSILON);
    }
}
