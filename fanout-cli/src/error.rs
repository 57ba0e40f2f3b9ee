//! Error types for the fanout binary.

use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug, Error)]
pub enum CliError {
    /// Logging or tracing could not be set up
    #[error("telemetry: {0}")]
    Telemetry(#[from] fanout_telemetry::TelemetryError),

    /// Redis configuration rejected
    #[error("redis: {0}")]
    Redis(#[from] fanout_redis::RedisError),

    /// Environment file present but unreadable
    #[error("environment file: {0}")]
    Env(#[from] dotenvy::Error),

    /// Signal handlers could not be installed
    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),
}
