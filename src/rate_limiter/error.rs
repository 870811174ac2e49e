//! Construction-time errors.
//!
//! Every invalid setting is rejected when a [`Policy`](super::Policy),
//! [`TokenBucket`](super::TokenBucket) or [`Limiter`](super::Limiter) is
//! built. The decision path (`allow`, `allow_n`, `peek`) has no error
//! channel at all: a throttled request is a `false`, not an `Err`.

/// Error returned when a limiter is configured with invalid settings.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Capacity was below one token, NaN or infinite.
    #[error("capacity must be a finite number of at least 1 token, got {0}")]
    InvalidCapacity(f64),

    /// Refill rate was zero, negative, NaN or infinite.
    #[error("refill rate must be a finite number of tokens per second greater than 0, got {0}")]
    InvalidRefillRate(f64),

    /// A `MaxKeys` eviction strategy was given a cap of zero.
    #[error("max_keys must be greater than 0")]
    InvalidMaxKeys,
}

/// Error returned when the background sweeper cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    /// A zero interval would turn the sweeper into a busy loop.
    #[error("sweep interval must be greater than 0")]
    ZeroInterval,

    /// The operating system refused to spawn the thread.
    #[error("failed to spawn sweeper thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidCapacity(0.0);
        assert_eq!(
            err.to_string(),
            "capacity must be a finite number of at least 1 token, got 0"
        );

        let err = ConfigError::InvalidRefillRate(-2.5);
        assert!(err.to_string().contains("-2.5"));

        assert_eq!(
            ConfigError::InvalidMaxKeys.to_string(),
            "max_keys must be greater than 0"
        );
        assert_eq!(
            SweeperError::ZeroInterval.to_string(),
            "sweep interval must be greater than 0"
        );
    }

    #[test]
    fn test_spawn_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
        let err = SweeperError::from(io);
        assert!(err.to_string().contains("no threads left"));
    }

    #[test]
    fn test_errors_are_std_errors() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        assert_error(&ConfigError::InvalidMaxKeys);
        assert_error(&SweeperError::ZeroInterval);
    }
}
