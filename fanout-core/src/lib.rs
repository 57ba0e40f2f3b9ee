//! # Fanout Core
//!
//! A reconnecting publish/subscribe relay over a single broker connection
//! pair: one connection publishes, the other subscribes.
//!
//! ## Features
//!
//! - **Lazy connections** - each side connects on first use and is reused after
//! - **Reconnect with backoff** - `min(attempt * 50ms, 2s)` between attempts
//! - **Re-subscription** - every registered channel is subscribed again after a reconnect
//! - **One handler per channel** - re-registration replaces the previous handler
//! - **Isolated delivery** - a failing or panicking handler only affects its own message
//! - **Graceful shutdown** - publishing stops before connections are torn down
//!
//! ## Quick Start
//!
//! ```rust
//! use fanout_core::{handler_fn, EventBus, HandlerError, MemoryBroker};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new(MemoryBroker::new());
//!
//! bus.subscribe(
//!     "contact.created",
//!     handler_fn(|payload| async move {
//!         tracing::info!(%payload, "contact created");
//!         Ok::<(), HandlerError>(())
//!     }),
//! )
//! .await;
//!
//! bus.publish("contact.created", &json!({ "id": 1, "name": "Ann" })).await;
//!
//! bus.disconnect().await;
//! # });
//! ```
//!
//! ## Error Handling
//!
//! `publish`, `subscribe` and `disconnect` never return errors: failures are
//! logged through `tracing` and the message is dropped. `try_publish` exposes
//! the outcome for callers that need it.

pub mod broker;
pub mod bus;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod memory;
pub mod registry;

pub use broker::{
    Broker, InboundMessage, MessageStream, PublishLink, SubscribeLink, SubscriberSession,
};
pub use bus::EventBus;
pub use config::{BusConfig, BusConfigBuilder, RetryPolicy};
pub use connection::{ConnectionState, PublishConnection, SubscribeConnection};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{BusError, HandlerError, Result};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use memory::MemoryBroker;
pub use registry::{HandlerRegistry, SharedHandler};

/// Prelude for common imports.
///
/// ```
/// use fanout_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::EventBus;
    pub use crate::config::{BusConfig, RetryPolicy};
    pub use crate::error::{BusError, HandlerError};
    pub use crate::handler::{EventHandler, handler_fn};
    pub use crate::memory::MemoryBroker;
}
