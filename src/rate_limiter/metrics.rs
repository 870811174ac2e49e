//! Snapshots for monitoring buckets and limiters.
//!
//! ```text
//!     Bucket snapshot:
//!     ┌─────────────────────────────────────┐
//!     │  Success Rate: 85%                  │
//!     │  Tokens: 3.50 / 10                  │
//!     │  Health: Healthy                    │
//!     └─────────────────────────────────────┘
//! ```
//!
//! Counters are kept outside the bucket lock and read without it, so a
//! snapshot taken while other threads are deciding is approximate.

use std::fmt;

/// Point-in-time view of one [`TokenBucket`](super::TokenBucket).
///
/// ```rust
/// use tokengate::TokenBucket;
///
/// let bucket = TokenBucket::new(10.0, 1.0).unwrap();
/// bucket.allow();
///
/// let metrics = bucket.metrics();
/// assert_eq!(metrics.total_allowed, 1);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMetrics {
    /// Number of requests allowed since creation or the last reset.
    ///
    /// An `allow_n` call counts once, whatever its cost.
    pub total_allowed: u64,

    /// Number of requests turned away, counted the same way.
    pub total_rejected: u64,

    /// Tokens in the bucket when the snapshot was taken.
    pub available_tokens: f64,

    /// Burst capacity of the bucket.
    pub capacity: f64,
}

impl BucketMetrics {
    /// Fraction of decisions that were allowed; 1.0 when nothing was asked yet.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            1.0
        } else {
            self.total_allowed as f64 / total as f64
        }
    }

    /// Fraction of decisions that were rejected.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Total decisions made.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_allowed + self.total_rejected
    }

    /// How much of the burst is currently spent: 0.0 full, 1.0 empty.
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.capacity <= 0.0 {
            0.0
        } else {
            (1.0 - self.available_tokens / self.capacity).clamp(0.0, 1.0)
        }
    }

    /// Coarse health classification.
    ///
    /// - `Critical`: more than half of all decisions were rejections
    /// - `Degraded`: the bucket cannot grant a token right now, or more than
    ///   30% of decisions were rejections
    /// - `Healthy`: otherwise
    pub fn health_status(&self) -> HealthStatus {
        let rejection_rate = self.rejection_rate();
        if rejection_rate > 0.5 {
            HealthStatus::Critical
        } else if self.available_tokens < 1.0 || rejection_rate > 0.3 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Multi-line, human readable report.
    pub fn summary(&self) -> String {
        format!(
            "Bucket Metrics:\n\
             ├─ Decisions:\n\
             │  ├─ Allowed: {}\n\
             │  ├─ Rejected: {}\n\
             │  └─ Success Rate: {:.2}%\n\
             ├─ Capacity:\n\
             │  ├─ Available Tokens: {:.2}/{}\n\
             │  └─ Utilization: {:.2}%\n\
             └─ Health: {}",
            self.total_allowed,
            self.total_rejected,
            self.success_rate() * 100.0,
            self.available_tokens,
            self.capacity,
            self.utilization() * 100.0,
            self.health_status(),
        )
    }
}

impl fmt::Display for BucketMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Health indicator derived from [`BucketMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Most requests get through and tokens are available.
    Healthy,
    /// The bucket is drained or a noticeable share of requests is throttled.
    Degraded,
    /// The majority of requests is being throttled.
    Critical,
}

impl HealthStatus {
    /// `true` for anything but [`HealthStatus::Healthy`].
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("Healthy"),
            Self::Degraded => f.write_str("Degraded"),
            Self::Critical => f.write_str("Critical"),
        }
    }
}

/// Registry-level statistics for a [`Limiter`](super::Limiter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    /// Keys that currently own a bucket.
    pub tracked_keys: usize,

    /// Buckets created since the limiter was built.
    pub total_created: u64,

    /// Buckets removed by eviction, `remove` or `clear`.
    pub total_evicted: u64,
}

impl LimiterStats {
    /// Share of created buckets that were later dropped.
    ///
    /// Close to 1.0 means keys come and go; close to 0.0 means the key set
    /// is stable (or nothing is evicting it).
    pub fn churn_ratio(&self) -> f64 {
        if self.total_created == 0 {
            0.0
        } else {
            self.total_evicted as f64 / self.total_created as f64
        }
    }

    /// Multi-line, human readable report.
    pub fn summary(&self) -> String {
        format!(
            "Limiter Stats:\n\
             ├─ Tracked Keys: {}\n\
             └─ Lifetime:\n\
             \x20  ├─ Total Created: {}\n\
             \x20  ├─ Total Evicted: {}\n\
             \x20  └─ Churn: {:.2}%",
            self.tracked_keys,
            self.total_created,
            self.total_evicted,
            self.churn_ratio() * 100.0,
        )
    }
}

impl fmt::Display for LimiterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(allowed: u64, rejected: u64, tokens: f64) -> BucketMetrics {
        BucketMetrics {
            total_allowed: allowed,
            total_rejected: rejected,
            available_tokens: tokens,
            capacity: 10.0,
        }
    }

    #[test]
    fn test_rates() {
        let m = metrics(80, 20, 5.0);
        assert_eq!(m.total_requests(), 100);
        assert_eq!(m.success_rate(), 0.8);
        assert!((m.rejection_rate() - 0.2).abs() < 1e-12);
        assert_eq!(m.utilization(), 0.5);
    }

    #[test]
    fn test_no_requests_yet() {
        let m = metrics(0, 0, 10.0);
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.utilization(), 0.0);
        assert_eq!(m.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status() {
        assert_eq!(metrics(90, 10, 4.0).health_status(), HealthStatus::Healthy);
        assert_eq!(metrics(90, 10, 0.5).health_status(), HealthStatus::Degraded);
        assert_eq!(metrics(60, 40, 4.0).health_status(), HealthStatus::Degraded);
        assert_eq!(metrics(40, 60, 4.0).health_status(), HealthStatus::Critical);

        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.is_unhealthy());
    }

    #[test]
    fn test_bucket_summary() {
        let display = format!("{}", metrics(5, 1, 2.5));
        assert!(display.contains("Allowed: 5"));
        assert!(display.contains("Rejected: 1"));
        assert!(display.contains("2.50/10"));
        assert!(display.contains("Health: Healthy"));
    }

    #[test]
    fn test_limiter_stats() {
        let stats = LimiterStats {
            tracked_keys: 3,
            total_created: 10,
            total_evicted: 7,
        };
        assert_eq!(stats.churn_ratio(), 0.7);

        let summary = stats.to_string();
        assert!(summary.contains("Tracked Keys: 3"));
        assert!(summary.contains("Total Evicted: 7"));

        let empty = LimiterStats {
            tracked_keys: 0,
            total_created: 0,
            total_evicted: 0,
        };
        assert_eq!(empty.churn_ratio(), 0.0);
    }
}
