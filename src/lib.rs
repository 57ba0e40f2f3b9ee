// Fanout - a reconnecting publish/subscribe event relay for Rust
//
// This library bundles the event bus core with its Redis broker, telemetry
// setup and contact audit listeners behind feature flags.

// Re-export core functionality
pub use fanout_core::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use fanout_redis;

#[cfg(feature = "telemetry")]
pub use fanout_telemetry;

#[cfg(feature = "audit")]
pub use fanout_audit;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Broker,
        BusConfig,
        BusError,
        ConnectionState,
        EventBus,
        EventHandler,
        HandlerError,
        MemoryBroker,
        RetryPolicy,
        handler_fn,
    };

    #[cfg(feature = "redis")]
    pub use fanout_redis::{RedisBroker, RedisConfig};

    #[cfg(feature = "telemetry")]
    pub use fanout_telemetry::{LogConfig, TelemetryConfig, init_tracing, shutdown_tracing};

    #[cfg(feature = "audit")]
    pub use fanout_audit::{
        AuditBackend, AuditEvent, Contact, ContactDeleted, ContactUpdated, init_audit_listeners,
        publish_contact_event,
    };
}
