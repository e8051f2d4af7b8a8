//! Global token-bucket rate limiting for all site requests.
//!
//! This module provides the [`RateLimiter`] struct, a single shared gate
//! that every network-issuing operation (login, page fetch, file fetch)
//! passes through immediately before sending its request.
//!
//! # Overview
//!
//! The bucket refills at a fixed rate and holds at most one second's worth
//! of tokens. Callers suspend in [`RateLimiter::acquire`] until their
//! tokens are available; waiters are served strictly first-come-first-served,
//! so the request rate stays bounded no matter how many logical tasks are
//! in flight at once.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use coursefetch_core::limiter::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(10));
//!
//! // Each request takes one token; the bucket paces everyone.
//! limiter.acquire(1).await;
//! // ... issue the request
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default bucket refill rate in tokens per second.
pub const DEFAULT_RATE_PER_SEC: u32 = 10;

/// Global token-bucket rate limiter.
///
/// Designed to be wrapped in `Arc` and shared by reference among every
/// component that issues network calls. Constructed explicitly per run -
/// never process-global - so tests can instantiate one against a paused
/// tokio clock.
///
/// # Ordering
///
/// `acquire` holds the internal `tokio::sync::Mutex` across the refill
/// sleep. That mutex queues waiters in FIFO order, so token grants are
/// first-come-first-served across all concurrently suspended callers.
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens added per second; also the bucket capacity.
    rate_per_sec: u32,
    /// Bucket fill state, guarded for atomic check-and-drain.
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    /// Tokens currently available. Fractional between refill ticks.
    tokens: f64,
    /// Time of the last refill accounting.
    refilled_at: Instant,
}

impl RateLimiter {
    /// Creates a limiter refilling at `rate_per_sec` tokens per second.
    ///
    /// The bucket starts full (capacity equals the rate), so the first
    /// second's worth of requests proceeds without delay. A rate of zero
    /// is treated as one token per second.
    #[must_use]
    #[instrument]
    pub fn new(rate_per_sec: u32) -> Self {
        let rate_per_sec = rate_per_sec.max(1);
        debug!(rate_per_sec, "creating rate limiter");
        Self {
            rate_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(rate_per_sec),
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Returns the configured refill rate in tokens per second.
    #[must_use]
    pub fn rate_per_sec(&self) -> u32 {
        self.rate_per_sec
    }

    /// Suspends until `n` tokens are available, then takes them.
    ///
    /// Call with `n = 1` immediately before issuing a request. Never
    /// errors; the only observable effect is the suspension itself.
    /// Acquisition order across waiters is FIFO.
    #[instrument(level = "debug", skip(self))]
    pub async fn acquire(&self, n: u32) {
        if n == 0 {
            return;
        }
        let needed = f64::from(n);
        let rate = f64::from(self.rate_per_sec);
        let capacity = f64::from(self.rate_per_sec);

        // Lock held across the sleep: the fair mutex queue IS the FIFO
        // hand-off between waiters.
        let mut bucket = self.bucket.lock().await;

        let now = Instant::now();
        let accrued = now.duration_since(bucket.refilled_at).as_secs_f64() * rate;
        bucket.tokens = (bucket.tokens + accrued).min(capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            return;
        }

        let deficit = needed - bucket.tokens;
        let wait = Duration::from_secs_f64(deficit / rate);
        debug!(wait_ms = wait.as_millis(), "rate limit: waiting for tokens");
        tokio::time::sleep(wait).await;

        // We slept exactly long enough to cover the deficit; everything
        // that accrued during the wait is consumed by this acquisition.
        bucket.tokens = 0.0;
        bucket.refilled_at = Instant::now();
    }
}
