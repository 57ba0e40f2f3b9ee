//! Tracer provider setup and teardown

use crate::{
    config::{TelemetryConfig, TracingExporter},
    error::{TelemetryError, TelemetryResult},
};
use opentelemetry::global;
use opentelemetry_sdk::trace::{RandomIdGenerator, SdkTracerProvider};
use tracing::info;

/// Build a tracer provider from configuration and install it globally.
///
/// Returns `None` when tracing is disabled; the global no-op provider then
/// stays in place and dispatch spans cost nothing. With the OTLP exporter
/// this must run inside a tokio runtime.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<Option<SdkTracerProvider>> {
    if !config.enable_tracing {
        return Ok(None);
    }
    config.validate()?;

    let builder = SdkTracerProvider::builder()
        .with_resource(config.create_resource())
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(config.tracing.sampler())
        .with_max_attributes_per_span(config.tracing.max_attributes_per_span)
        .with_max_events_per_span(config.tracing.max_events_per_span);

    let provider = match config.tracing.exporter {
        #[cfg(feature = "otlp")]
        TracingExporter::Otlp => {
            use opentelemetry_otlp::WithExportConfig;

            let endpoint = config.tracing.otlp_endpoint.as_ref().ok_or_else(|| {
                TelemetryError::Config("OTLP endpoint not configured".to_string())
            })?;

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

            builder.with_batch_exporter(exporter).build()
        }

        #[cfg(not(feature = "otlp"))]
        TracingExporter::Otlp => {
            return Err(TelemetryError::Config(
                "OTLP exporter not available (feature not enabled)".to_string(),
            ));
        }

        TracingExporter::None => builder.build(),
    };

    global::set_tracer_provider(provider.clone());
    info!(
        service = %config.service_name,
        exporter = ?config.tracing.exporter,
        "Tracing initialized"
    );

    Ok(Some(provider))
}

/// Flush pending spans and shut the provider down.
pub fn shutdown_tracing(provider: SdkTracerProvider) -> TelemetryResult<()> {
    provider
        .shutdown()
        .map_err(|e| TelemetryError::Shutdown(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, Tracer};

    #[test]
    fn test_disabled_tracing_installs_nothing() {
        let config = TelemetryConfig::new("test").with_tracing(false);
        assert!(init_tracing(&config).unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TelemetryConfig::new("test").with_sampling_ratio(2.0);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_provider_without_exporter() {
        let config = TelemetryConfig::new("test").without_exporter();
        let provider = init_tracing(&config).unwrap().unwrap();

        let tracer = global::tracer("fanout-telemetry-test");
        let mut span = tracer.start("EVENT_HANDLER test");
        span.end();

        shutdown_tracing(provider).unwrap();
    }
}
