//! Tracing configuration

use crate::error::{TelemetryError, TelemetryResult};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::Sampler;
use serde::{Deserialize, Serialize};

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name, reported as `service.name`
    pub service_name: String,

    /// Service version
    pub service_version: Option<String>,

    /// Environment (e.g., "production", "staging", "development")
    pub environment: Option<String>,

    /// Enable tracing
    pub enable_tracing: bool,

    /// Tracing configuration
    pub tracing: TracingConfig,

    /// Additional resource attributes
    pub resource_attributes: Vec<(String, String)>,
}

/// Tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Exporter type
    pub exporter: TracingExporter,

    /// OTLP gRPC endpoint
    pub otlp_endpoint: Option<String>,

    /// Sampling ratio (0.0 to 1.0)
    pub sampling_ratio: f64,

    /// Maximum attributes per span
    pub max_attributes_per_span: u32,

    /// Maximum events per span
    pub max_events_per_span: u32,
}

/// Tracing exporter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingExporter {
    /// OTLP exporter (OpenTelemetry Protocol over gRPC)
    Otlp,
    /// Spans are created and sampled but not exported
    None,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "fanout".to_string(),
            service_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            environment: Some("development".to_string()),
            enable_tracing: true,
            tracing: TracingConfig::default(),
            resource_attributes: Vec::new(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            exporter: TracingExporter::Otlp,
            otlp_endpoint: Some("http://localhost:4317".to_string()),
            sampling_ratio: 1.0,
            max_attributes_per_span: 128,
            max_events_per_span: 128,
        }
    }
}

impl TracingConfig {
    /// Sampler matching the configured ratio
    pub fn sampler(&self) -> Sampler {
        if self.sampling_ratio >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_ratio <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_ratio)
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with a service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set environment
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Enable tracing
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Export spans over OTLP to the given endpoint
    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.tracing.exporter = TracingExporter::Otlp;
        self.tracing.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Keep spans in-process only
    pub fn without_exporter(mut self) -> Self {
        self.tracing.exporter = TracingExporter::None;
        self.tracing.otlp_endpoint = None;
        self
    }

    /// Set the sampling ratio
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.tracing.sampling_ratio = ratio;
        self
    }

    /// Add a resource attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.push((key.into(), value.into()));
        self
    }

    /// Create OpenTelemetry resource from configuration
    pub fn create_resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.name", self.service_name.clone())];

        if let Some(ref version) = self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }

        if let Some(ref env) = self.environment {
            attributes.push(KeyValue::new("deployment.environment", env.clone()));
        }

        for (key, value) in &self.resource_attributes {
            attributes.push(KeyValue::new(key.clone(), value.clone()));
        }

        Resource::builder().with_attributes(attributes).build()
    }

    /// Validate configuration
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.is_empty() {
            return Err(TelemetryError::Config(
                "Service name cannot be empty".to_string(),
            ));
        }

        if self.enable_tracing
            && self.tracing.exporter == TracingExporter::Otlp
            && self.tracing.otlp_endpoint.is_none()
        {
            return Err(TelemetryError::Config(
                "OTLP endpoint required for OTLP tracing exporter".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.tracing.sampling_ratio) {
            return Err(TelemetryError::Config(
                "Sampling ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}
