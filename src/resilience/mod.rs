//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound chain call:
//!     → rate_limit.rs (admit into a trailing window, waiting if full)
//!     → chain client (failover on connection errors)
//!
//! Event sync cycle deferred:
//!     → backoff.rs (jittered exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Callers are never rejected by the local limiter, only delayed
//! - Windows are scoped so background sync traffic cannot starve user reads
//! - Writes are never retried; only reads fail over and repeat

pub mod backoff;
pub mod rate_limit;

pub use rate_limit::{RateLimiter, RateScope};
