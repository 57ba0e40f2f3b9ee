//! Redis error types.

use fanout_core::BusError;
use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command error.
    #[error("Command error: {0}")]
    Command(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error.
    #[error("Operation timed out")]
    Timeout,

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<RedisError> for BusError {
    fn from(err: RedisError) -> Self {
        if err.is_retryable() {
            BusError::Connection(err.to_string())
        } else {
            BusError::Command(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_map_to_retryable_bus_errors() {
        let err: BusError = RedisError::Connection("refused".to_string()).into();
        assert!(err.is_retryable());

        let err: BusError = RedisError::Timeout.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_command_errors_are_not_retried() {
        let err: BusError = RedisError::Command("WRONGTYPE".to_string()).into();
        assert!(matches!(err, BusError::Command(_)));
        assert!(!err.is_retryable());

        let err: BusError = RedisError::Config("bad url".to_string()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_errors_from_redis_are_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = RedisError::from(redis::RedisError::from(io));
        assert!(err.is_retryable());
    }
}
