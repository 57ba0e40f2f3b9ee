//! Integration tests for fanout-audit

use fanout_audit::*;
use fanout_core::{BusConfig, EventBus, MemoryBroker, RetryPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn bus(broker: &MemoryBroker) -> EventBus {
    let config = BusConfig::builder()
        .service_name("audit-test")
        .retry(RetryPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
        ))
        .build();
    EventBus::with_config(broker.clone(), config)
}

async fn wait_for_subscriptions(broker: &MemoryBroker) {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Some(id) = broker.latest_session()
                && CONTACT_CHANNELS
                    .iter()
                    .all(|c| broker.subscriptions(id).contains(*c))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("audit listeners never subscribed");
}

async fn wait_for_events(backend: &MemoryBackend, count: usize) -> Vec<AuditEvent> {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let events = backend.get_events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("audit events never arrived")
}

#[tokio::test]
async fn test_contact_lifecycle_is_audited() {
    let broker = MemoryBroker::new();
    let bus = bus(&broker);
    let backend = MemoryBackend::new();

    init_audit_listeners(&bus, Arc::new(backend.clone())).await;
    wait_for_subscriptions(&broker).await;

    let contact = Contact {
        id: 42,
        name: "Ann".to_string(),
        email: "ann@example.com".to_string(),
        phone: Some("555-0100".to_string()),
        created_at: None,
        updated_at: None,
    };
    publish_contact_event(&bus, &contact).await;
    publish_contact_event(
        &bus,
        &ContactUpdated {
            id: 42,
            changes: json!({ "phone": null }),
        },
    )
    .await;
    publish_contact_event(&bus, &ContactDeleted { id: 42 }).await;

    wait_for_events(&backend, 3).await;

    let created = backend.events_of(CONTACT_CREATED).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].payload, serde_json::to_value(&contact).unwrap());

    let updated = backend.events_of(CONTACT_UPDATED).await;
    assert_eq!(
        updated[0].payload,
        json!({ "id": 42, "changes": { "phone": null } })
    );

    let deleted = backend.events_of(CONTACT_DELETED).await;
    assert_eq!(deleted[0].payload, json!({ "id": 42 }));

    bus.disconnect().await;
}

#[tokio::test]
async fn test_listeners_register_every_contact_channel() {
    let broker = MemoryBroker::new();
    let bus = bus(&broker);

    init_audit_listeners(&bus, Arc::new(MemoryBackend::new())).await;
    init_audit_listeners(&bus, Arc::new(MemoryBackend::new())).await;

    let mut channels = bus.channels();
    channels.sort();
    assert_eq!(
        channels,
        vec![CONTACT_CREATED, CONTACT_DELETED, CONTACT_UPDATED]
    );
}

#[tokio::test]
async fn test_file_backend_through_the_bus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let broker = MemoryBroker::new();
    let bus = bus(&broker);

    init_audit_listeners(&bus, Arc::new(FileBackend::new(&path))).await;
    wait_for_subscriptions(&broker).await;

    publish_contact_event(&bus, &ContactDeleted { id: 5 }).await;

    let line = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await
                && let Some(line) = contents.lines().next()
            {
                return line.to_string();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let event: AuditEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(event.event_type, CONTACT_DELETED);
    assert_eq!(event.payload, json!({ "id": 5 }));
}
