//! Channel to handler registry.

use crate::handler::EventHandler;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handler reference.
pub type SharedHandler = Arc<dyn EventHandler>;

/// At most one handler per channel.
///
/// Cloning is cheap; clones share the same map. The key set is what the
/// subscriber re-subscribes to after every reconnect.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, SharedHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the channel.
    ///
    /// Returns `true` when an existing handler was replaced.
    pub fn insert(&self, channel: &str, handler: SharedHandler) -> bool {
        let replaced = self.handlers.insert(channel.to_string(), handler).is_some();
        if replaced {
            warn!(
                channel = %channel,
                "Handler already registered for channel. Overwriting"
            );
        } else {
            debug!(channel = %channel, "Registered handler");
        }
        replaced
    }

    /// Look up the handler for a channel.
    pub fn get(&self, channel: &str) -> Option<SharedHandler> {
        self.handlers.get(channel).map(|entry| entry.value().clone())
    }

    /// Check whether a channel has a handler.
    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    /// Snapshot of the registered channel names, in no particular order.
    pub fn channels(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}
