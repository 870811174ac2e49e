//! # Bucket Policy
//!
//! A [`Policy`] is the pair of numbers that fully describes a token bucket:
//!
//! ```text
//!     ┌──────────────────────────────┐
//!     │   capacity                   │ ← burst limit
//!     │   ┌─────────────────────┐    │
//!     │   │ 🪙 🪙 🪙 🪙 🪙 ...  │    │ ← available tokens (fractional)
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   refill_rate: tokens/sec    │ ← continuous, sampled lazily
//!     └──────────────────────────────┘
//! ```
//!
//! A `Policy` can only be obtained through a validating constructor, so every
//! bucket built from one is known to have a positive, finite capacity and
//! refill rate.

use super::error::ConfigError;

/// Validated token-bucket parameters.
///
/// ## Examples
///
/// ```rust
/// use tokengate::Policy;
///
/// // Burst of 5, sustained 2 requests/second
/// let policy = Policy::new(5.0, 2.0).unwrap();
/// assert_eq!(policy.capacity(), 5.0);
///
/// // 50 requests/second, burst of 100
/// let policy = Policy::per_second(50.0).unwrap();
/// assert_eq!(policy.capacity(), 100.0);
///
/// // Invalid settings fail here, not on the first request
/// assert!(Policy::new(0.0, 1.0).is_err());
/// assert!(Policy::new(1.0, -3.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    capacity: f64,
    refill_rate: f64,
}

impl Policy {
    /// Creates a policy with the given burst `capacity` and `refill_rate`
    /// (tokens per second).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCapacity`] unless `capacity` is a finite
    /// number of at least one token, since a smaller bucket could never grant
    /// a request. Returns [`ConfigError::InvalidRefillRate`] unless
    /// `refill_rate` is a finite number greater than zero.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ConfigError> {
        if !(capacity.is_finite() && capacity >= 1.0) {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        if !is_positive_finite(refill_rate) {
            return Err(ConfigError::InvalidRefillRate(refill_rate));
        }
        Ok(Self {
            capacity,
            refill_rate,
        })
    }

    /// Per-second limiting with a burst of twice the rate.
    pub fn per_second(requests_per_second: f64) -> Result<Self, ConfigError> {
        Self::new(requests_per_second * 2.0, requests_per_second)
    }

    /// Per-minute limiting: a full minute's quota may be spent at once, and
    /// it trickles back continuously over the following minute.
    pub fn per_minute(requests_per_minute: f64) -> Result<Self, ConfigError> {
        Self::new(requests_per_minute, requests_per_minute / 60.0)
    }

    /// Sets the capacity to `multiplier` times the refill rate.
    ///
    /// ```rust
    /// use tokengate::Policy;
    ///
    /// let policy = Policy::new(10.0, 10.0).unwrap().with_burst_multiplier(5.0).unwrap();
    /// assert_eq!(policy.capacity(), 50.0);
    /// ```
    pub fn with_burst_multiplier(self, multiplier: f64) -> Result<Self, ConfigError> {
        Self::new(self.refill_rate * multiplier, self.refill_rate)
    }

    /// Maximum number of tokens a bucket can hold.
    #[inline]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second.
    #[inline]
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Sustained admissions per second once the burst is spent.
    ///
    /// Refill is continuous, so this is the refill rate itself.
    #[inline]
    pub fn effective_rate_per_second(&self) -> f64 {
        self.refill_rate
    }

    /// Seconds an empty bucket needs to refill completely.
    #[inline]
    pub fn time_to_full_secs(&self) -> f64 {
        self.capacity / self.refill_rate
    }
}

#[inline]
fn is_positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert!(Policy::new(5.0, 2.0).is_ok());

        assert_eq!(
            Policy::new(0.0, 2.0).unwrap_err(),
            ConfigError::InvalidCapacity(0.0)
        );
        assert_eq!(
            Policy::new(-1.0, 2.0).unwrap_err(),
            ConfigError::InvalidCapacity(-1.0)
        );
        assert_eq!(
            Policy::new(5.0, 0.0).unwrap_err(),
            ConfigError::InvalidRefillRate(0.0)
        );
        assert_eq!(
            Policy::new(5.0, -0.5).unwrap_err(),
            ConfigError::InvalidRefillRate(-0.5)
        );
    }

    #[test]
    fn test_capacity_below_one_token_is_rejected() {
        assert_eq!(
            Policy::new(0.5, 1.0).unwrap_err(),
            ConfigError::InvalidCapacity(0.5)
        );
        assert!(Policy::new(0.999, 100.0).is_err());
        assert!(Policy::per_second(0.4).is_err());
        assert_eq!(Policy::new(1.0, 1.0).unwrap().capacity(), 1.0);
    }

    #[test]
    fn test_policy_rejects_non_finite() {
        assert!(matches!(
            Policy::new(f64::NAN, 1.0),
            Err(ConfigError::InvalidCapacity(_))
        ));
        assert!(matches!(
            Policy::new(f64::INFINITY, 1.0),
            Err(ConfigError::InvalidCapacity(_))
        ));
        assert!(matches!(
            Policy::new(1.0, f64::NAN),
            Err(ConfigError::InvalidRefillRate(_))
        ));
    }

    #[test]
    fn test_fractional_rates_are_allowed() {
        let policy = Policy::new(1.0, 0.25).unwrap();
        assert_eq!(policy.refill_rate(), 0.25);
        assert_eq!(policy.time_to_full_secs(), 4.0);
    }

    #[test]
    fn test_per_second() {
        let policy = Policy::per_second(100.0).unwrap();
        assert_eq!(policy.capacity(), 200.0);
        assert_eq!(policy.refill_rate(), 100.0);
        assert_eq!(policy.effective_rate_per_second(), 100.0);

        assert!(Policy::per_second(0.0).is_err());
    }

    #[test]
    fn test_per_minute() {
        let policy = Policy::per_minute(120.0).unwrap();
        assert_eq!(policy.capacity(), 120.0);
        assert_eq!(policy.effective_rate_per_second(), 2.0);
    }

    #[test]
    fn test_with_burst_multiplier() {
        let policy = Policy::per_second(10.0)
            .unwrap()
            .with_burst_multiplier(5.0)
            .unwrap();

        assert_eq!(policy.capacity(), 50.0);
        assert_eq!(policy.refill_rate(), 10.0);

        assert!(Policy::per_second(10.0)
            .unwrap()
            .with_burst_multiplier(0.0)
            .is_err());
    }
}
