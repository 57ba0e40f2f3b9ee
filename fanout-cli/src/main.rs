//! `fanout` - runs the contact event relay.
//!
//! Startup: load `.env`, parse flags, start logging and tracing, build the
//! Redis-backed bus, register the audit listeners. Shutdown on SIGINT or
//! SIGTERM: disconnect the bus first, then flush traces.

use clap::Parser;
use fanout_audit::{AuditBackend, FileBackend, TracingBackend, init_audit_listeners};
use fanout_core::EventBus;
use fanout_redis::RedisBroker;
use fanout_telemetry::{init_tracing, shutdown_tracing};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod config;
mod error;

use config::{Cli, load_env_file};
use error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = load_env_file() {
        eprintln!("fanout: {e}");
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();

    // The guard must outlive every log line, including shutdown.
    let _guard = match cli.log_config().init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("fanout: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Event relay failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let provider = init_tracing(&cli.telemetry_config())?;

    let broker = RedisBroker::new(cli.redis_config())?;
    let bus = EventBus::with_config(broker, cli.bus_config());

    let backend: Arc<dyn AuditBackend> = match &cli.audit_file {
        Some(path) => Arc::new(FileBackend::new(path)),
        None => Arc::new(TracingBackend::new()),
    };
    init_audit_listeners(&bus, backend).await;

    info!(
        service = %cli.service_name,
        environment = %cli.app_env,
        "Event relay running"
    );

    let signal_result = shutdown_signal().await;

    bus.disconnect().await;
    if let Some(provider) = provider {
        shutdown_tracing(provider)?;
    }

    signal_result
}

async fn shutdown_signal() -> CliResult<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    info!("Shutdown signal received, starting graceful shutdown");
    Ok(())
}
