//! Command-line and environment configuration.

use clap::Parser;
use fanout_core::BusConfig;
use fanout_redis::RedisConfig;
use fanout_telemetry::{LogConfig, LogFormat, LogLevel, TelemetryConfig};
use std::path::PathBuf;

/// Fanout event relay: subscribes audit listeners to contact events on Redis.
#[derive(Debug, Parser)]
#[command(name = "fanout")]
#[command(version)]
#[command(about = "Reconnecting Redis event relay with contact audit listeners")]
pub struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379", value_parser = redis_url)]
    pub redis_url: String,

    /// Service name for logs and traces
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "contacts-api")]
    pub service_name: String,

    /// OTLP gRPC endpoint; spans are not exported when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", value_parser = http_url)]
    pub otlp_endpoint: Option<String>,

    /// Deployment environment (development, test, production)
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub app_env: String,

    /// Log format: json, plain, pretty or compact
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Append audit events to this file as JSON lines instead of logging them
    #[arg(long, env = "AUDIT_LOG_FILE")]
    pub audit_file: Option<PathBuf>,
}

fn redis_url(value: &str) -> Result<String, String> {
    RedisConfig::new(value)
        .validate()
        .map(|()| value.to_string())
        .map_err(|e| e.to_string())
}

fn http_url(value: &str) -> Result<String, String> {
    let url = url::Url::parse(value).map_err(|e| format!("invalid URL '{value}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        other => Err(format!("expected an http(s) URL, got scheme '{other}'")),
    }
}

impl Cli {
    /// Logging configuration.
    pub fn log_config(&self) -> LogConfig {
        LogConfig::new()
            .level(self.log_level)
            .format(self.log_format)
            .with_colors(self.log_format == LogFormat::Pretty)
    }

    /// Tracing configuration.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let config = TelemetryConfig::new(&self.service_name).with_environment(&self.app_env);
        match &self.otlp_endpoint {
            Some(endpoint) => config.with_otlp_endpoint(endpoint),
            None => config.without_exporter(),
        }
    }

    /// Redis configuration: the URL from the command line, the rest from
    /// `REDIS_*` variables.
    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::from_env().url(&self.redis_url).build()
    }

    /// Event bus configuration.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig::new(&self.service_name)
    }
}

/// Load `.env`, or `.env.test` when `APP_ENV=test`. A missing file is fine.
pub fn load_env_file() -> Result<(), dotenvy::Error> {
    let file = match std::env::var("APP_ENV").as_deref() {
        Ok("test") => ".env.test",
        _ => ".env",
    };
    match dotenvy::from_filename(file) {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
