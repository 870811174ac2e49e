//! # Rate Limiter Module
//!
//! Internal implementation of the admission controller, split by concern.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── clock.rs        (Injectable time sources)
//!     ├── config.rs       (Validated bucket policy)
//!     ├── error.rs        (Construction-time errors)
//!     ├── bucket.rs       (Single token bucket)
//!     ├── limiter.rs      (Per-key bucket registry)
//!     ├── eviction.rs     (Idle-key eviction strategies)
//!     └── metrics.rs      (Monitoring snapshots)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     allow(key)
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Limiter │ ◄── get-or-create the key's bucket
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Bucket  │ ◄── refill, then consume under the bucket's lock
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Clock  │ ◄── elapsed time since the last refill
//!     └─────────┘
//! ```

mod bucket;
mod clock;
mod config;
mod error;
mod eviction;
mod limiter;
mod metrics;

/// Time sources
pub use clock::{Clock, ManualClock, MonotonicClock};

/// Bucket parameters
pub use config::Policy;

/// Errors raised while building limiters
pub use error::{ConfigError, SweeperError};

/// Single-stream token bucket
pub use bucket::TokenBucket;

/// Keyed limiter and its background sweeper
pub use limiter::{Limiter, SweeperHandle};

/// Eviction strategies
pub use eviction::{EvictionCandidate, EvictionPolicy, IdleTimeout, MaxKeys, NoEviction};

/// Monitoring snapshots
pub use metrics::{BucketMetrics, HealthStatus, LimiterStats};
