//! Event bus configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect delay policy.
///
/// The delay before retry `n` (1-based) is `min(n * step, max_delay)`. This
/// grows linearly and then flattens; it is not exponential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay added per attempt.
    #[serde(with = "millis_serde", default = "default_step")]
    pub step: Duration,
    /// Upper bound on any single delay.
    #[serde(with = "millis_serde", default = "default_max_delay")]
    pub max_delay: Duration,
}

fn default_step() -> Duration {
    Duration::from_millis(50)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(2000)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: default_step(),
            max_delay: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom step and cap.
    pub fn new(step: Duration, max_delay: Duration) -> Self {
        Self { step, max_delay }
    }

    /// Delay to wait before the given retry attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step
            .checked_mul(attempt)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Service name used for the dispatch tracer.
    pub service_name: String,
    /// Reconnect delay policy shared by both connections.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Retries allowed for a single publish command. `None` retries forever.
    pub publish_max_retries: Option<u32>,
    /// Reconnect attempts allowed for the subscriber. `None` retries forever.
    pub subscribe_max_retries: Option<u32>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            service_name: "fanout".to_string(),
            retry: RetryPolicy::default(),
            publish_max_retries: Some(3),
            subscribe_max_retries: None,
        }
    }
}

impl BusConfig {
    /// Create a configuration for the given service.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::new()
    }
}

/// Builder for bus configuration.
#[derive(Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    /// Set the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the reconnect delay policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the per-command retry ceiling for publishing.
    pub fn publish_max_retries(mut self, retries: Option<u32>) -> Self {
        self.config.publish_max_retries = retries;
        self
    }

    /// Set the reconnect ceiling for the subscriber.
    pub fn subscribe_max_retries(mut self, retries: Option<u32>) -> Self {
        self.config.subscribe_max_retries = retries;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> BusConfig {
        self.config
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_linear_then_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(39), Duration::from_millis(1950));
        assert_eq!(policy.delay(40), Duration::from_millis(2000));
        assert_eq!(policy.delay(41), Duration::from_millis(2000));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(2000));
    }

    #[test]
    fn test_config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.publish_max_retries, Some(3));
        assert_eq!(config.subscribe_max_retries, None);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_builder() {
        let config = BusConfig::builder()
            .service_name("contacts-api")
            .retry(RetryPolicy::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
            ))
            .publish_max_retries(Some(1))
            .subscribe_max_retries(Some(10))
            .build();

        assert_eq!(config.service_name, "contacts-api");
        assert_eq!(config.retry.delay(10), Duration::from_millis(5));
        assert_eq!(config.publish_max_retries, Some(1));
        assert_eq!(config.subscribe_max_retries, Some(10));
    }

    #[test]
    fn test_config_deserializes_with_default_retry() {
        let config: BusConfig = serde_json::from_str(
            r#"{"service_name":"svc","publish_max_retries":3,"subscribe_max_retries":null}"#,
        )
        .unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.subscribe_max_retries, None);
    }
}
