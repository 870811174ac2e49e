//! # Idle-key Eviction
//!
//! A [`Limiter`](super::Limiter) never forgets a key on its own. Keyed by
//! unbounded identifiers (client IPs, user IDs), its map would grow forever,
//! so eviction is layered on top as a pluggable strategy.
//!
//! ```text
//!     sweep():
//!
//!     ┌──────────────┐  snapshot   ┌──────────────────┐  victims  ┌───────────┐
//!     │ key → bucket │ ──────────► │ EvictionPolicy   │ ────────► │ remove_if │
//!     │ (DashMap)    │ (key, seen) │ ::select(now, …) │           │ unchanged │
//!     └──────────────┘             └──────────────────┘           └───────────┘
//! ```
//!
//! A strategy only *chooses*. The limiter removes a chosen key only if its
//! bucket has not been touched since the snapshot, so a key that receives
//! traffic while the sweep runs keeps its state.
//!
//! It also keeps any chosen bucket that is not full yet. A freshly created
//! bucket starts full, so forgetting a full bucket changes nothing a caller
//! can observe, while forgetting a drained one would hand its key a free
//! burst. A bucket idle for `capacity / refill_rate` seconds is always full.

use super::error::ConfigError;
use std::time::Duration;

/// A key together with the clock reading of its bucket's last refill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    /// The tracked key.
    pub key: K,
    /// When the bucket last refilled (i.e. was last used or peeked).
    pub last_seen: Duration,
}

impl<K> EvictionCandidate<K> {
    /// Time since the bucket was last seen; zero if `now` is earlier.
    #[inline]
    pub fn idle_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_seen)
    }
}

/// Strategy deciding which tracked keys to forget.
///
/// Implement this to plug in custom policies, e.g. per-tenant caps.
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::{EvictionCandidate, EvictionPolicy};
///
/// /// Forgets keys prefixed with `tmp:` as soon as a sweep runs.
/// struct DropTemporary;
///
/// impl EvictionPolicy<String> for DropTemporary {
///     fn select(
///         &self,
///         _now: Duration,
///         candidates: Vec<EvictionCandidate<String>>,
///     ) -> Vec<EvictionCandidate<String>> {
///         candidates.into_iter().filter(|c| c.key.starts_with("tmp:")).collect()
///     }
/// }
/// ```
pub trait EvictionPolicy<K>: Send + Sync {
    /// Picks the candidates to evict.
    fn select(
        &self,
        now: Duration,
        candidates: Vec<EvictionCandidate<K>>,
    ) -> Vec<EvictionCandidate<K>>;

    /// Number of keys above which the limiter should warn that it is growing
    /// past what this strategy aims for.
    fn key_limit(&self) -> Option<usize> {
        None
    }
}

/// Keeps every key forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEviction;

impl<K> EvictionPolicy<K> for NoEviction {
    fn select(
        &self,
        _now: Duration,
        _candidates: Vec<EvictionCandidate<K>>,
    ) -> Vec<EvictionCandidate<K>> {
        Vec::new()
    }
}

/// Evicts keys that have been idle for at least `ttl`.
///
/// Keys whose bucket has not refilled to capacity yet are kept until a later
/// sweep finds them full.
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::IdleTimeout;
///
/// // Forget clients not seen for five minutes
/// let policy = IdleTimeout::new(Duration::from_secs(300));
/// assert_eq!(policy.ttl(), Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout {
    ttl: Duration,
}

impl IdleTimeout {
    /// Creates a strategy evicting keys idle for `ttl` or longer.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// The idle threshold.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K> EvictionPolicy<K> for IdleTimeout {
    fn select(
        &self,
        now: Duration,
        candidates: Vec<EvictionCandidate<K>>,
    ) -> Vec<EvictionCandidate<K>> {
        candidates
            .into_iter()
            .filter(|c| c.idle_for(now) >= self.ttl)
            .collect()
    }
}

/// Caps the number of tracked keys, evicting the least recently seen first.
///
/// Only full buckets are removed, so the map can sit above the cap while the
/// oldest keys are still refilling.
///
/// ```rust
/// use tokengate::MaxKeys;
///
/// let policy = MaxKeys::new(10_000).unwrap();
/// assert_eq!(policy.max_keys(), 10_000);
/// assert!(MaxKeys::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MaxKeys {
    max_keys: usize,
}

impl MaxKeys {
    /// Creates an LRU cap of `max_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMaxKeys`] for a cap of zero.
    pub fn new(max_keys: usize) -> Result<Self, ConfigError> {
        if max_keys == 0 {
            return Err(ConfigError::InvalidMaxKeys);
        }
        Ok(Self { max_keys })
    }

    /// The cap.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }
}

impl<K> EvictionPolicy<K> for MaxKeys {
    fn select(
        &self,
        _now: Duration,
        mut candidates: Vec<EvictionCandidate<K>>,
    ) -> Vec<EvictionCandidate<K>> {
        let excess = candidates.len().saturating_sub(self.max_keys);
        if excess == 0 {
            return Vec::new();
        }

        // Oldest first
        candidates.sort_by_key(|c| c.last_seen);
        candidates.truncate(excess);
        candidates
    }

    fn key_limit(&self) -> Option<usize> {
        Some(self.max_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(seen_secs: &[u64]) -> Vec<EvictionCandidate<usize>> {
        seen_secs
            .iter()
            .enumerate()
            .map(|(key, &secs)| EvictionCandidate {
                key,
                last_seen: Duration::from_secs(secs),
            })
            .collect()
    }

    fn keys(selected: Vec<EvictionCandidate<usize>>) -> Vec<usize> {
        let mut keys: Vec<usize> = selected.into_iter().map(|c| c.key).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_no_eviction() {
        let selected = NoEviction.select(Duration::from_secs(1_000), candidates(&[0, 1, 2]));
        assert!(selected.is_empty());
        assert_eq!(EvictionPolicy::<usize>::key_limit(&NoEviction), None);
    }

    #[test]
    fn test_idle_timeout() {
        let policy = IdleTimeout::new(Duration::from_secs(60));
        let now = Duration::from_secs(100);

        // idle for 100, 41, 60, 0
        let selected = policy.select(now, candidates(&[0, 59, 40, 100]));
        assert_eq!(keys(selected), vec![0, 2]);
    }

    #[test]
    fn test_idle_timeout_ignores_future_readings() {
        let policy = IdleTimeout::new(Duration::from_secs(1));
        let selected = policy.select(Duration::from_secs(5), candidates(&[10]));
        assert!(selected.is_empty());
    }

    #[test]
    fn test_max_keys_evicts_oldest() {
        let policy = MaxKeys::new(2).unwrap();
        let selected = policy.select(Duration::from_secs(100), candidates(&[50, 10, 70, 30]));
        assert_eq!(keys(selected), vec![1, 3]);
        assert_eq!(EvictionPolicy::<usize>::key_limit(&policy), Some(2));
    }

    #[test]
    fn test_max_keys_under_cap() {
        let policy = MaxKeys::new(10).unwrap();
        let selected = policy.select(Duration::ZERO, candidates(&[1, 2, 3]));
        assert!(selected.is_empty());
    }

    #[test]
    fn test_max_keys_validation() {
        assert_eq!(MaxKeys::new(0).unwrap_err(), ConfigError::InvalidMaxKeys);
    }

    #[test]
    fn test_candidate_idle_for() {
        let c = EvictionCandidate {
            key: "a",
            last_seen: Duration::from_secs(3),
        };
        assert_eq!(c.idle_for(Duration::from_secs(10)), Duration::from_secs(7));
        assert_eq!(c.idle_for(Duration::from_secs(1)), Duration::ZERO);
    }
}
