//! # Keyed Limiter
//!
//! A [`Limiter`] multiplexes the token-bucket decision over an open-ended set
//! of keys, each with its own independent balance.
//!
//! ```text
//!     Requests:
//!     alice:GET /items ──┐
//!     bob:GET /items ────┤
//!     alice:POST /items ─┼──► Limiter ──► one TokenBucket per key
//!     10.0.0.7 ──────────┘        │
//!                                 ▼
//!                          ┌──────────────┐
//!                          │  DashMap     │
//!                          │  ┌────────┐  │
//!                          │  │key → TB│  │  TB = TokenBucket,
//!                          │  │key → TB│  │       own mutex each
//!                          │  └────────┘  │
//!                          └──────────────┘
//! ```
//!
//! ## Exactly-once bucket creation
//!
//! The first request for a key goes through the map's entry API, which holds
//! the key's shard exclusively only while the bucket is inserted. Two
//! concurrent first-time callers therefore always end up sharing the single
//! winning bucket; a "check, then insert" race that would silently double the
//! burst for that key cannot happen.
//!
//! ## Locking
//!
//! Decisions run while holding a shared (read) guard on the key's shard and
//! the bucket's own mutex. Different keys never wait on each other's bucket
//! lock, and eviction (which takes the shard exclusively) can never remove a
//! bucket out from under an in-flight decision.

use super::{
    bucket::TokenBucket,
    clock::{Clock, MonotonicClock},
    config::Policy,
    error::{ConfigError, SweeperError},
    eviction::{EvictionCandidate, EvictionPolicy},
    metrics::LimiterStats,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

type BucketMap<K, C> = DashMap<K, Arc<TokenBucket<C>>, ahash::RandomState>;

/// Per-key token-bucket limiter.
///
/// ## Usage
///
/// ```rust
/// use tokengate::Limiter;
///
/// // Every key gets a burst of 3 and 1 request/second
/// let limiter: Limiter<String> = Limiter::new(3.0, 1.0).unwrap();
///
/// for _ in 0..3 {
///     assert!(limiter.allow("user1:api/getData"));
/// }
/// assert!(!limiter.allow("user1:api/getData"));
///
/// // Other keys are unaffected
/// assert!(limiter.allow("user2:api/getData"));
/// ```
///
/// In a server, share it behind an `Arc` and turn `false` into a 429:
///
/// ```rust
/// use std::net::IpAddr;
/// use std::sync::Arc;
/// use tokengate::{Limiter, Policy};
///
/// let limiter: Arc<Limiter<IpAddr>> = Arc::new(Limiter::with_policy(Policy::per_second(100.0).unwrap()));
///
/// fn handle_request(limiter: &Limiter<IpAddr>, client: IpAddr) -> u16 {
///     if !limiter.allow(&client) {
///         return 429;
///     }
///     200
/// }
///
/// assert_eq!(handle_request(&limiter, "192.168.1.1".parse().unwrap()), 200);
/// ```
pub struct Limiter<K, C = MonotonicClock>
where
    K: Eq + Hash,
    C: Clock,
{
    /// Key to bucket. Values are `Arc`ed so [`Limiter::bucket`] can hand out
    /// handles without holding a map guard.
    buckets: BucketMap<K, C>,

    /// Policy for keys without an override.
    policy: Policy,

    /// Per-key policies, fixed at build time.
    overrides: HashMap<K, Policy, ahash::RandomState>,

    /// Cloned into every bucket.
    clock: C,

    /// Strategy run by [`Limiter::sweep`].
    eviction: Option<Box<dyn EvictionPolicy<K>>>,

    /// Mirrors the map size without locking every shard.
    tracked: AtomicUsize,

    total_created: AtomicU64,
    total_evicted: AtomicU64,
}

impl<K> Limiter<K, MonotonicClock>
where
    K: Eq + Hash + Clone,
{
    /// Creates a limiter giving every key a bucket of `capacity` tokens
    /// refilled at `refill_rate` tokens per second.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError`] on a non-positive or non-finite value.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ConfigError> {
        Ok(Self::with_policy(Policy::new(capacity, refill_rate)?))
    }

    /// Creates a limiter applying `policy` to every key.
    pub fn with_policy(policy: Policy) -> Self {
        Self::with_clock(policy, MonotonicClock::new())
    }
}

impl<K, C> Limiter<K, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    /// Creates a limiter whose buckets read time from `clock`.
    pub fn with_clock(policy: Policy, clock: C) -> Self {
        Self::from_parts(policy, HashMap::default(), clock, None)
    }

    pub(crate) fn from_parts(
        policy: Policy,
        overrides: HashMap<K, Policy, ahash::RandomState>,
        clock: C,
        eviction: Option<Box<dyn EvictionPolicy<K>>>,
    ) -> Self {
        // More shards = less contention between unrelated keys
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .saturating_mul(4)
            .next_power_of_two()
            .clamp(4, 64);

        Self {
            buckets: DashMap::with_hasher_and_shard_amount(ahash::RandomState::new(), shards),
            policy,
            overrides,
            clock,
            eviction,
            tracked: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
        }
    }

    /// Decides whether one unit of work for `key` may proceed now.
    ///
    /// Creates the key's bucket, full, on first sight.
    #[inline]
    pub fn allow<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.with_bucket(key, |bucket| bucket.allow())
    }

    /// Decides whether a unit of work costing `n` tokens for `key` may
    /// proceed now. All or nothing, see [`TokenBucket::allow_n`].
    #[inline]
    pub fn allow_n<Q>(&self, key: &Q, n: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.with_bucket(key, |bucket| bucket.allow_n(n))
    }

    /// Current token estimate for `key`.
    ///
    /// An unknown key reports the capacity it would start with, as if its
    /// bucket already existed and were full. No bucket is created.
    pub fn peek<Q>(&self, key: &Q) -> f64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.buckets.get(key) {
            Some(bucket) => bucket.peek(),
            None => self.policy_for(key).capacity(),
        }
    }

    /// Returns the bucket for `key`, creating it if needed.
    ///
    /// The handle stays usable after the key is evicted or removed, but is
    /// then detached: the limiter will create a fresh bucket for the key on
    /// its next request.
    pub fn bucket<Q>(&self, key: &Q) -> Arc<TokenBucket<C>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.with_bucket_arc(key, Arc::clone)
    }

    /// Whether `key` currently owns a bucket.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.contains_key(key)
    }

    /// The policy `key` gets: its override if one was configured, the
    /// default policy otherwise.
    pub fn policy_for<Q>(&self, key: &Q) -> Policy
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.overrides.get(key).copied().unwrap_or(self.policy)
    }

    /// The default policy.
    #[inline]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Number of keys that currently own a bucket.
    #[inline]
    pub fn tracked_keys(&self) -> usize {
        self.tracked.load(Ordering::Acquire)
    }

    /// Forgets `key`. Returns whether it was tracked.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.buckets.remove(key).is_some() {
            self.on_removed(1);
            true
        } else {
            false
        }
    }

    /// Forgets every key.
    pub fn clear(&self) {
        let mut removed = 0;
        self.buckets.retain(|_, _| {
            removed += 1;
            false
        });
        self.on_removed(removed);
        info!("Cleared {} buckets", removed);
    }

    /// Registry statistics.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            tracked_keys: self.tracked_keys(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }

    /// Runs the configured eviction strategy once and returns the number of
    /// keys removed. Without a strategy this is a no-op.
    pub fn sweep(&self) -> usize {
        match &self.eviction {
            Some(strategy) => self.evict_with(strategy.as_ref()),
            None => 0,
        }
    }

    /// Runs `strategy` once over the tracked keys and returns the number of
    /// keys removed.
    ///
    /// A key selected by the strategy is only removed if its bucket has not
    /// refilled since the snapshot was taken and would be full by now. A
    /// partly drained bucket stays, since recreating it full would grant
    /// tokens the key has not earned.
    pub fn evict_with<P>(&self, strategy: &P) -> usize
    where
        P: EvictionPolicy<K> + ?Sized,
    {
        let now = self.clock.now();
        let candidates: Vec<EvictionCandidate<K>> = self
            .buckets
            .iter()
            .map(|entry| EvictionCandidate {
                key: entry.key().clone(),
                last_seen: entry.value().last_refill_at(),
            })
            .collect();
        let examined = candidates.len();

        let victims = strategy.select(now, candidates);
        let now = self.clock.now();

        let mut removed = 0;
        for victim in victims {
            let evicted = self
                .buckets
                .remove_if(&victim.key, |_, bucket| {
                    bucket.is_reclaimable(victim.last_seen, now)
                })
                .is_some();
            if evicted {
                removed += 1;
            }
        }

        if removed > 0 {
            self.on_removed(removed);
            info!("Evicted {} of {} tracked keys", removed, examined);
        } else {
            debug!("Sweep examined {} keys, evicted none", examined);
        }
        removed
    }

    /// The clock buckets read time from.
    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs `f` on the key's bucket while holding a shared guard on its
    /// shard, creating the bucket first if needed.
    #[inline]
    fn with_bucket<Q, R>(&self, key: &Q, f: impl FnOnce(&TokenBucket<C>) -> R) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.with_bucket_arc(key, |bucket| f(&**bucket))
    }

    fn with_bucket_arc<Q, R>(&self, key: &Q, f: impl FnOnce(&Arc<TokenBucket<C>>) -> R) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        // Fast path: the key is already tracked
        if let Some(bucket) = self.buckets.get(key) {
            return f(bucket.value());
        }

        // Slow path: atomic get-or-create under the shard's write lock
        let (guard, created) = match self.buckets.entry(key.to_owned()) {
            Entry::Occupied(occupied) => (occupied.into_ref().downgrade(), false),
            Entry::Vacant(vacant) => {
                let policy = self.policy_for(key);
                let bucket = Arc::new(TokenBucket::with_clock(policy, self.clock.clone()));
                (vacant.insert(bucket).downgrade(), true)
            }
        };

        if created {
            self.on_created();
        }
        f(guard.value())
    }

    fn on_created(&self) {
        let tracked = self.tracked.fetch_add(1, Ordering::AcqRel) + 1;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        debug!("Created bucket (tracked: {})", tracked);

        if let Some(limit) = self.eviction.as_ref().and_then(|e| e.key_limit()) {
            if tracked == limit + 1 {
                warn!(
                    "Tracked keys exceeded eviction limit of {}; run sweep() or start_sweeper()",
                    limit
                );
            }
        }
    }

    fn on_removed(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.tracked.fetch_sub(count, Ordering::AcqRel);
        self.total_evicted.fetch_add(count as u64, Ordering::Relaxed);
    }
}

impl<K, C> Limiter<K, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Starts a background thread running [`Limiter::sweep`] every
    /// `interval`.
    ///
    /// The thread stops when [`SweeperHandle::stop`] is called or the handle
    /// is dropped.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use tokengate::{IdleTimeout, Limiter, LimiterBuilder};
    ///
    /// let limiter: Arc<Limiter<String>> = Arc::new(
    ///     LimiterBuilder::new()
    ///         .capacity(10.0)
    ///         .refill_rate(1.0)
    ///         .eviction(IdleTimeout::new(Duration::from_secs(300)))
    ///         .build()
    ///         .unwrap(),
    /// );
    ///
    /// let sweeper = limiter.clone().start_sweeper(Duration::from_secs(60)).unwrap();
    /// // ...
    /// sweeper.stop();
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if `interval` is zero or the thread cannot be spawned.
    pub fn start_sweeper(self: Arc<Self>, interval: Duration) -> Result<SweeperHandle, SweeperError> {
        if interval.is_zero() {
            return Err(SweeperError::ZeroInterval);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let limiter = self;

        let handle = thread::Builder::new()
            .name("tokengate-sweeper".to_string())
            .spawn(move || {
                info!("Started sweeper thread (interval: {:?})", interval);

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Sweeper thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            limiter.sweep();
                        }
                    }
                }
            })?;

        Ok(SweeperHandle { handle, stop_tx })
    }
}

impl<K, C> std::fmt::Debug for Limiter<K, C>
where
    K: Eq + Hash,
    C: Clock,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("policy", &self.policy)
            .field("overrides", &self.overrides.len())
            .field("tracked_keys", &self.tracked.load(Ordering::Acquire))
            .field("eviction", &self.eviction.is_some())
            .finish()
    }
}

/// Handle to a running sweeper thread.
///
/// Dropping the handle also stops the thread, at its next wake-up.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: thread::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to exit.
    pub fn stop(self) {
        // A send error means the thread already exited.
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("Sweeper thread panicked");
        }
    }

    /// Whether the sweeper thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
