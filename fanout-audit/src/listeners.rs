//! Audit listeners for contact events.

use crate::backend::AuditBackend;
use crate::contacts::CONTACT_CHANNELS;
use crate::event::AuditEvent;
use async_trait::async_trait;
use fanout_core::{EventBus, EventHandler, HandlerError};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Handler that records every payload on one channel as an audit event.
pub struct AuditListener {
    event_type: String,
    backend: Arc<dyn AuditBackend>,
}

impl AuditListener {
    /// Audit `event_type` deliveries into `backend`.
    pub fn new(event_type: impl Into<String>, backend: Arc<dyn AuditBackend>) -> Self {
        Self {
            event_type: event_type.into(),
            backend,
        }
    }

    /// Channel this listener audits.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

#[async_trait]
impl EventHandler for AuditListener {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        let event = AuditEvent::new(self.event_type.clone(), payload);
        self.backend
            .write(&event)
            .await
            .map_err(|e| HandlerError::Failed(format!("audit write failed: {e}")))
    }
}

/// Subscribe an audit listener to every contact channel.
///
/// Re-running this replaces the previous listeners, as with any
/// re-registration on the bus.
pub async fn init_audit_listeners(bus: &EventBus, backend: Arc<dyn AuditBackend>) {
    info!("Initializing audit log listeners");
    for channel in CONTACT_CHANNELS {
        bus.subscribe(channel, AuditListener::new(channel, backend.clone()))
            .await;
    }
    info!(channels = CONTACT_CHANNELS.len(), "Audit log listeners initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuditBackendError, MemoryBackend};
    use serde_json::json;

    struct BrokenBackend;

    #[async_trait]
    impl AuditBackend for BrokenBackend {
        async fn write(&self, _event: &AuditEvent) -> Result<(), AuditBackendError> {
            Err(AuditBackendError::Other("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_listener_records_payload_unchanged() {
        let backend = MemoryBackend::new();
        let listener = AuditListener::new("contact.created", Arc::new(backend.clone()));
        let payload = json!({ "id": 1, "name": "Ann", "email": "ann@example.com" });

        listener.handle(payload.clone()).await.unwrap();

        let events = backend.get_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "contact.created");
        assert_eq!(events[0].payload, payload);
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_handler_error() {
        let listener = AuditListener::new("contact.deleted", Arc::new(BrokenBackend));
        let err = listener.handle(json!({ "id": 1 })).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(msg) if msg.contains("disk full")));
    }
}
