//! Error types for logging and tracing setup

use thiserror::Error;

/// Result type alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry error types
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exporter error
    #[error("Exporter error: {0}")]
    Exporter(String),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Shutdown error
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
