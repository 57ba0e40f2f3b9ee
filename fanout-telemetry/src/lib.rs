//! # Fanout Telemetry
//!
//! Logging and OpenTelemetry setup shared by fanout services.
//!
//! - [`logging`] installs a `tracing-subscriber` registry writing JSON (or
//!   plain, pretty, compact) lines through a non-blocking writer.
//! - [`init_tracing`] installs a global OpenTelemetry tracer provider; the
//!   event bus creates its delivery spans through it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fanout_telemetry::{LogConfig, TelemetryConfig, init_tracing, shutdown_tracing};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _guard = LogConfig::default().init()?;
//!     let provider = init_tracing(&TelemetryConfig::new("contacts-api"))?;
//!
//!     // ... run the service ...
//!
//!     if let Some(provider) = provider {
//!         shutdown_tracing(provider)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod tracing_setup;

pub use config::{TelemetryConfig, TracingConfig, TracingExporter};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, Rotation};
pub use tracing_setup::{init_tracing, shutdown_tracing};

// Re-export for callers that hold the provider
pub use opentelemetry_sdk::trace::SdkTracerProvider;
pub use tracing_appender::non_blocking::WorkerGuard;
