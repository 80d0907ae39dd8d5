//! Record pacing using a token bucket
//!
//! The RateLimiter bounds how fast bulk ingestion hands records to the
//! reconciler, keeping load on the catalog and the work queue steady during
//! large backfills. It knows nothing about records or reconciliation; the
//! ingestor simply acquires one token per record.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Micro-tokens in one whole token; lets fractional rates use integer atomics
const UNIT: u64 = 1_000_000;

/// Shared token-bucket rate limiter
///
/// Uses atomics for lock-free token tracking:
/// - `rate`: refill speed in micro-tokens per second (0 = unlimited)
/// - `capacity`: bucket size in micro-tokens (burst)
/// - `tokens`: available micro-tokens
/// - `last_refill`: nanoseconds since `origin` at the last refill
///
/// Time is measured with [`tokio::time::Instant`], so paused-clock tests
/// observe exact waits.
#[derive(Clone)]
pub struct RateLimiter {
    rate: Arc<AtomicU64>,
    capacity: Arc<AtomicU64>,
    tokens: Arc<AtomicU64>,
    last_refill: Arc<AtomicU64>,
    origin: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `per_second` acquisitions per second with a
    /// bucket of `burst` tokens
    ///
    /// The bucket starts full. A non-positive or non-finite rate means unlimited.
    ///
    /// # Examples
    ///
    /// ```
    /// use podcast_sync::rate_limiter::RateLimiter;
    ///
    /// // one record every two seconds, no bursting
    /// let limiter = RateLimiter::new(0.5, 1);
    /// assert_eq!(limiter.rate(), Some(0.5));
    /// ```
    #[must_use]
    pub fn new(per_second: f64, burst: u32) -> Self {
        let capacity = u64::from(burst.max(1)) * UNIT;
        Self {
            rate: Arc::new(AtomicU64::new(Self::to_micro(per_second))),
            capacity: Arc::new(AtomicU64::new(capacity)),
            tokens: Arc::new(AtomicU64::new(capacity)),
            last_refill: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    /// Create a limiter that never waits
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(0.0, 1)
    }

    /// Change the rate; takes effect for waiting and future acquisitions
    pub fn set_rate(&self, per_second: f64) {
        self.refill_tokens();
        self.rate.store(Self::to_micro(per_second), Ordering::SeqCst);
    }

    /// Current rate in tokens per second, or None if unlimited
    pub fn rate(&self) -> Option<f64> {
        let rate = self.rate.load(Ordering::Relaxed);
        if rate == 0 {
            None
        } else {
            Some(rate as f64 / UNIT as f64)
        }
    }

    /// Wait until one token is available and take it
    pub async fn acquire(&self) {
        loop {
            // Re-read the rate each iteration so dynamic changes take effect
            let rate = self.rate.load(Ordering::Relaxed);
            if rate == 0 {
                return;
            }

            self.refill_tokens();

            let current = self.tokens.load(Ordering::SeqCst);
            if current >= UNIT {
                if self
                    .tokens
                    .compare_exchange(current, current - UNIT, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return;
                }
                continue;
            }

            // Cap the sleep so rate changes are noticed promptly
            let missing = UNIT - current;
            let wait_ms = (missing as f64 / rate as f64 * 1000.0).ceil() as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        if self.rate.load(Ordering::Relaxed) == 0 {
            return true;
        }
        self.refill_tokens();
        let current = self.tokens.load(Ordering::SeqCst);
        current >= UNIT
            && self
                .tokens
                .compare_exchange(current, current - UNIT, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Add tokens for the time elapsed since the last refill, capped at capacity
    fn refill_tokens(&self) {
        let rate = self.rate.load(Ordering::Relaxed);
        let now = self.now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        if rate == 0 {
            self.last_refill.store(now, Ordering::SeqCst);
            return;
        }

        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let to_add = (rate as f64 * elapsed_secs) as u64;

        if to_add > 0
            && self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let capacity = self.capacity.load(Ordering::Relaxed);
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |tokens| {
                    Some(tokens.saturating_add(to_add).min(capacity))
                });
        }
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn to_micro(per_second: f64) -> u64 {
        if per_second.is_finite() && per_second > 0.0 {
            ((per_second * UNIT as f64).round() as u64).max(1)
        } else {
            0
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate())
            .field("burst", &(self.capacity.load(Ordering::Relaxed) / UNIT))
            .finish()
    }
}
