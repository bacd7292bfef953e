//! Pacing and retry primitives.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Sliding-window limiter with minimum spacing and throttle cooldown |
//! | [`backoff`] | Exponential backoff with ±25% jitter |
//!
//! ```rust
//! use chat_connector::resilience::rate_limiter::{RateLimitPolicy, RateLimiter};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let policy = RateLimitPolicy::new()
//!     .with_max_requests_per_minute(10)
//!     .with_min_interval(Duration::from_millis(500));
//! let limiter = RateLimiter::new(policy);
//!
//! let now = Instant::now();
//! if limiter.check_budget(now).allowed {
//!     limiter.record_request(now);
//! }
//! ```

pub mod backoff;
pub mod rate_limiter;

pub use backoff::Backoff;
pub use rate_limiter::{
    BudgetDecision, BudgetReason, RateLimitPolicy, RateLimiter, RateLimiterSnapshot, MAX_COOLDOWN,
};
