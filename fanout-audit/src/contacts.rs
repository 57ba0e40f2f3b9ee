//! Contact domain events.
//!
//! The contacts service publishes one of these after each successful write.
//! Payloads go over the bus as plain JSON documents, so listeners that do not
//! depend on this crate can still read them.

use chrono::{DateTime, Utc};
use fanout_core::{BusError, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel for newly created contacts.
pub const CONTACT_CREATED: &str = "contact.created";
/// Channel for updated contacts.
pub const CONTACT_UPDATED: &str = "contact.updated";
/// Channel for deleted contacts.
pub const CONTACT_DELETED: &str = "contact.deleted";

/// Every contact channel, in publish order of a contact's life.
pub const CONTACT_CHANNELS: [&str; 3] = [CONTACT_CREATED, CONTACT_UPDATED, CONTACT_DELETED];

/// A contact as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address (unique)
    pub email: String,
    /// Phone number
    pub phone: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload of `contact.updated`: the id and the fields that were submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdated {
    /// Contact ID
    pub id: i64,
    /// Submitted changes, as received
    pub changes: Value,
}

/// Payload of `contact.deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDeleted {
    /// Contact ID
    pub id: i64,
}

/// A payload bound to its channel.
pub trait ContactEvent: Serialize + Send + Sync {
    /// Channel the event is published on.
    const CHANNEL: &'static str;
}

/// `contact.created` carries the full contact.
impl ContactEvent for Contact {
    const CHANNEL: &'static str = CONTACT_CREATED;
}

impl ContactEvent for ContactUpdated {
    const CHANNEL: &'static str = CONTACT_UPDATED;
}

impl ContactEvent for ContactDeleted {
    const CHANNEL: &'static str = CONTACT_DELETED;
}

/// Publish a contact event on its channel. Best effort, like
/// [`EventBus::publish`].
pub async fn publish_contact_event<E: ContactEvent>(bus: &EventBus, event: &E) {
    bus.publish(E::CHANNEL, event).await;
}

/// Publish a contact event and report the outcome.
pub async fn try_publish_contact_event<E: ContactEvent>(
    bus: &EventBus,
    event: &E,
) -> Result<(), BusError> {
    bus.try_publish(E::CHANNEL, event).await
}
