//! Event bus error types.

use thiserror::Error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised inside the bus.
///
/// None of these cross the publish/subscribe boundary: the public API logs
/// and discards them. They exist so each internal step has an explicit
/// outcome.
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker unreachable, handshake failed or the link dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A command was rejected by the broker.
    #[error("Command error: {0}")]
    Command(String),

    /// A command kept failing until the retry ceiling was reached.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The last error observed.
        last: String,
    },

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Channel names must be non-empty.
    #[error("Invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// The termination flag is set.
    #[error("Event bus is shutting down")]
    ShuttingDown,

    /// The connection has been closed and will not come back.
    #[error("Connection closed")]
    Closed,
}

impl BusError {
    /// Check if this error is worth another attempt after reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed)
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure reported by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The handler task panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError::Failed(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError::Failed(s.to_string())
    }
}
