//! # Time Sources (clock.rs)
//!
//! Buckets never read the system time directly. They ask a [`Clock`] for the
//! current reading, expressed as a [`Duration`] since that clock's origin.
//! Only differences between readings matter, so the origin is arbitrary.
//!
//! ```text
//!     Clock implementations:
//!
//!     MonotonicClock (production):
//!     ├─ Origin: first use in the process (shared by every instance)
//!     └─ Reading: Instant::now() - origin, never goes backwards
//!
//!     ManualClock (tests, simulations):
//!     ├─ Origin: 0
//!     ├─ Reading: whatever was last advanced/set
//!     └─ Clones share the same reading
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

// Process-wide origin so that readings from distinct MonotonicClock values
// are comparable.
static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// A supplier of non-decreasing time readings.
///
/// Implementations must be cheap to clone: a [`Limiter`](super::Limiter)
/// hands a clone of its clock to every bucket it creates.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Returns the current reading, measured from the clock's origin.
    fn now(&self) -> Duration;
}

/// The production clock, backed by [`Instant`].
///
/// # Example
///
/// ```rust
/// use tokengate::{Clock, MonotonicClock};
///
/// let clock = MonotonicClock::new();
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock {
    _private: (),
}

impl MonotonicClock {
    /// Creates a handle to the process-wide monotonic clock.
    pub fn new() -> Self {
        MONOTONIC_ORIGIN.get_or_init(Instant::now);
        Self { _private: () }
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now(&self) -> Duration {
        MONOTONIC_ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

/// A manually driven clock.
///
/// Time only moves when [`advance`](ManualClock::advance) or
/// [`set`](ManualClock::set) is called, which makes refill arithmetic fully
/// deterministic. Clones observe and drive the same reading.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let handle = clock.clone();
///
/// handle.advance(Duration::from_millis(1500));
/// assert_eq!(clock.now(), Duration::from_millis(1500));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock already reading `start`.
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::new();
        clock.set(start);
        clock
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = saturating_nanos(delta);
        let mut current = self.nanos.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(delta);
            match self.nanos.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Sets the reading to `at`.
    ///
    /// Unlike [`advance`](ManualClock::advance) this may move time backwards,
    /// which is how tests simulate a misbehaving time source.
    pub fn set(&self, at: Duration) {
        self.nanos.store(saturating_nanos(at), Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Nanoseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub(crate) fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();

        for _ in 0..10 {
            std::thread::sleep(Duration::from_millis(1));
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_monotonic_clocks_share_origin() {
        let a = MonotonicClock::new();
        std::thread::sleep(Duration::from_millis(5));
        let b = MonotonicClock::new();

        // Same origin, so b cannot lag a by the sleep we just took.
        let ra = a.now();
        let rb = b.now();
        assert!(rb >= ra);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));

        clock.set(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_manual_clock_clones_share_reading() {
        let clock = ManualClock::starting_at(Duration::from_secs(10));
        let other = clock.clone();

        other.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(11));
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new();
        clock.set(Duration::MAX);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_saturating_nanos() {
        assert_eq!(saturating_nanos(Duration::from_millis(3)), 3_000_000);
        assert_eq!(saturating_nanos(Duration::MAX), u64::MAX);
        assert_eq!(
            saturating_nanos(Duration::from_nanos(u64::MAX) + Duration::from_secs(1)),
            u64::MAX
        );
    }

    #[test]
    fn test_manual_clock_concurrent_advance() {
        let clock = ManualClock::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        clock.advance(Duration::from_nanos(1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(clock.now(), Duration::from_nanos(8000));
    }
}
