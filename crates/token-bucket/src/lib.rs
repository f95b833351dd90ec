//! A continuous-fill token bucket with a bounded FIFO waiter queue.
//!
//! This is the single rate-limiting primitive shared by connection
//! admission, request admission, and byte-rate shaping in Lactoserv: all
//! three are `tokens = <connections | requests | bytes>` views over the
//! same [`TokenBucket`].

mod bucket;
mod config;

pub use bucket::{Grant, TokenBucket};
pub use config::{TimeUnit, TokenBucketConfig};
