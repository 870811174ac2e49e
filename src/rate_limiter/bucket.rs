//! # Token Bucket
//!
//! One bucket holds the admission state of a single key (or of a single
//! unkeyed stream).
//!
//! ```text
//!     capacity = 5, refill_rate = 2/s
//!
//!     t=0.0   [🪙🪙🪙🪙🪙]  5.0   five allow() → true
//!     t=0.0   [          ]  0.0   sixth allow() → false
//!     t=0.5   [🪙        ]  1.0   allow() → true, 0.0 left
//!     t=1.75  [🪙🪙 ½    ]  2.5   peek() → 2.5
//! ```
//!
//! ## Lazy continuous refill
//!
//! There is no timer thread. Every decision first credits the bucket with
//! `elapsed × refill_rate` tokens (capped at capacity) for the time since the
//! previous decision, then tries to consume. Fractional tokens carry over
//! between calls.
//!
//! ## Locking
//!
//! The balance and the refill timestamp form one unit of state guarded by a
//! per-bucket [`parking_lot::Mutex`]. The critical section is a handful of
//! float operations, so contention is limited to callers of the same bucket
//! and lasts nanoseconds. Decision counters live outside the lock.

use super::{
    clock::{saturating_nanos, Clock, MonotonicClock},
    config::Policy,
    error::ConfigError,
    metrics::BucketMetrics,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Mutable part of a bucket, only touched under the lock.
#[derive(Debug)]
struct BucketState {
    /// Invariant: `0.0 <= tokens <= capacity`.
    tokens: f64,
    /// Invariant: never decreases.
    last_refill_at: Duration,
}

/// Thread-safe token bucket with continuous refill.
///
/// `TokenBucket` is used directly when a single, unkeyed stream needs
/// limiting. For per-key limiting use [`Limiter`](super::Limiter), which
/// owns one bucket per key.
///
/// ## Example
///
/// ```rust
/// use tokengate::TokenBucket;
///
/// // Burst of 5, then 2 requests per second
/// let bucket = TokenBucket::new(5.0, 2.0).unwrap();
///
/// for _ in 0..5 {
///     assert!(bucket.allow());
/// }
/// assert!(!bucket.allow());
/// ```
///
/// Tests and simulations inject a [`ManualClock`](super::ManualClock):
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::{ManualClock, Policy, TokenBucket};
///
/// let clock = ManualClock::new();
/// let bucket = TokenBucket::with_clock(Policy::new(5.0, 2.0).unwrap(), clock.clone());
///
/// while bucket.allow() {}
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(bucket.peek(), 2.0);
/// ```
pub struct TokenBucket<C: Clock = MonotonicClock> {
    state: Mutex<BucketState>,
    policy: Policy,
    clock: C,
    total_allowed: AtomicU64,
    total_rejected: AtomicU64,
}

impl TokenBucket<MonotonicClock> {
    /// Creates a full bucket on the system monotonic clock.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError`] if `capacity` or `refill_rate` is not a
    /// finite number greater than zero.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ConfigError> {
        Ok(Self::with_policy(Policy::new(capacity, refill_rate)?))
    }

    /// Creates a full bucket from an already validated policy.
    pub fn with_policy(policy: Policy) -> Self {
        Self::with_clock(policy, MonotonicClock::new())
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Creates a full bucket that reads time from `clock`.
    ///
    /// The refill timestamp starts at the clock's current reading.
    pub fn with_clock(policy: Policy, clock: C) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(BucketState {
                tokens: policy.capacity(),
                last_refill_at: now,
            }),
            policy,
            clock,
            total_allowed: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Decides whether one unit of work may proceed now.
    ///
    /// Refills the bucket for the time elapsed since the previous call, then
    /// consumes one token if at least one is available. A rejection leaves the
    /// balance untouched.
    #[inline]
    pub fn allow(&self) -> bool {
        self.try_consume(1.0)
    }

    /// Decides whether a unit of work costing `n` tokens may proceed now.
    ///
    /// All or nothing: either `n` tokens are taken or none are. `n == 0`
    /// always succeeds, and `n` above the capacity can never succeed.
    ///
    /// ```rust
    /// use tokengate::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(10.0, 1.0).unwrap();
    /// assert!(bucket.allow_n(7));
    /// assert!(!bucket.allow_n(4)); // only 3 left, nothing taken
    /// assert!(bucket.allow_n(3));
    /// ```
    #[inline]
    pub fn allow_n(&self, n: u64) -> bool {
        if n == 0 {
            return true;
        }
        self.try_consume(n as f64)
    }

    /// Returns the current token estimate without consuming anything.
    ///
    /// This brings the refill bookkeeping up to date, which can only raise or
    /// hold the balance, so interleaving `peek` calls never changes the
    /// outcome of the next `allow` beyond what elapsed time alone produces.
    pub fn peek(&self) -> f64 {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.refill(&mut state, now);
        state.tokens
    }

    /// How long until `n` tokens will be available, assuming no other caller
    /// consumes in between.
    ///
    /// Returns `Some(Duration::ZERO)` if they are available now and `None` if
    /// `n` exceeds the capacity, since such a request can never be granted.
    /// Useful for filling a `Retry-After` style hint.
    pub fn time_until_available(&self, n: u64) -> Option<Duration> {
        let needed = n as f64;
        if needed > self.policy.capacity() {
            return None;
        }

        let deficit = needed - self.peek();
        if deficit <= 0.0 {
            return Some(Duration::ZERO);
        }

        let secs = deficit / self.policy.refill_rate();
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    /// Refills the bucket to capacity and zeroes its decision counters.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state.tokens = self.policy.capacity();
            if now > state.last_refill_at {
                state.last_refill_at = now;
            }
        }
        self.total_allowed.store(0, Ordering::Relaxed);
        self.total_rejected.store(0, Ordering::Relaxed);
    }

    /// Burst capacity of this bucket.
    #[inline]
    pub fn capacity(&self) -> f64 {
        self.policy.capacity()
    }

    /// Tokens added per second.
    #[inline]
    pub fn refill_rate(&self) -> f64 {
        self.policy.refill_rate()
    }

    /// The policy this bucket was built from.
    #[inline]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Clock reading at the most recent refill.
    ///
    /// Every `allow`, `allow_n` and `peek` refreshes it, which makes it the
    /// "last seen" time used by idle eviction.
    pub fn last_refill_at(&self) -> Duration {
        self.state.lock().last_refill_at
    }

    /// Snapshot of the decision counters and the stored balance.
    ///
    /// The balance is reported as of the last refill; this call does not
    /// refill.
    pub fn metrics(&self) -> BucketMetrics {
        let available_tokens = self.state.lock().tokens;
        BucketMetrics {
            total_allowed: self.total_allowed.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            available_tokens,
            capacity: self.policy.capacity(),
        }
    }

    /// Whether the bucket still has the refill timestamp `last_seen` and
    /// would be full at `now`. Nothing is refilled.
    ///
    /// Only such a bucket can be dropped and later recreated full without
    /// handing out tokens it has not earned.
    pub(crate) fn is_reclaimable(&self, last_seen: Duration, now: Duration) -> bool {
        let state = self.state.lock();
        if state.last_refill_at != last_seen {
            return false;
        }
        let elapsed = now.saturating_sub(state.last_refill_at).as_secs_f64();
        state.tokens + elapsed * self.policy.refill_rate() >= self.policy.capacity()
    }

    #[inline]
    fn try_consume(&self, cost: f64) -> bool {
        let granted = {
            let mut state = self.state.lock();
            // Read under the lock so readings are ordered like the decisions
            let now = self.clock.now();
            self.refill(&mut state, now);
            if state.tokens >= cost {
                state.tokens -= cost;
                true
            } else {
                false
            }
        };

        if granted {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
        }
        granted
    }

    /// Credits the bucket for the time elapsed up to `now`.
    ///
    /// A reading earlier than the last refill counts as zero elapsed time and
    /// leaves the timestamp where it was.
    #[inline]
    fn refill(&self, state: &mut BucketState, now: Duration) {
        match now.checked_sub(state.last_refill_at) {
            Some(elapsed) => {
                if !elapsed.is_zero() {
                    let credit = elapsed.as_secs_f64() * self.policy.refill_rate();
                    state.tokens = (state.tokens + credit).min(self.policy.capacity());
                    state.last_refill_at = now;
                }
            }
            None => {
                trace!(
                    now_ns = saturating_nanos(now),
                    last_refill_ns = saturating_nanos(state.last_refill_at),
                    "clock reading went backwards, treating elapsed time as zero"
                );
            }
        }
    }
}

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenBucket")
            .field("capacity", &self.policy.capacity())
            .field("refill_rate", &self.policy.refill_rate())
            .field("available_tokens", &state.tokens)
            .field("last_refill_at", &state.last_refill_at)
            .finish()
    }
}
