//! # Fanout Redis
//!
//! Redis broker for the fanout event bus.
//!
//! ## Features
//!
//! - **Multiplexed publisher**: one connection shared by every publish
//! - **Split pub/sub subscriber**: commands and messages on separate halves
//! - **Bounded commands**: connect and command timeouts surface as retryable errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fanout_core::{EventBus, BusConfig};
//! use fanout_redis::{RedisBroker, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_env().build();
//!     let bus = EventBus::with_config(RedisBroker::new(config)?, BusConfig::new("contacts-api"));
//!
//!     bus.publish("contact.deleted", &serde_json::json!({ "id": 7 })).await;
//!     bus.disconnect().await;
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod error;

pub use broker::RedisBroker;
pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use fanout_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::broker::RedisBroker;
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
}
