//! Contact events and audit logging for the fanout event bus
//!
//! The contacts service publishes [`Contact`], [`ContactUpdated`] and
//! [`ContactDeleted`] on their channels; [`init_audit_listeners`] subscribes
//! one [`AuditListener`] per channel that records each delivery as an
//! [`AuditEvent`] in an [`AuditBackend`].
//!
//! # Quick Start
//!
//! ```no_run
//! use fanout_audit::*;
//! use fanout_core::{EventBus, MemoryBroker};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let bus = EventBus::new(MemoryBroker::new());
//! init_audit_listeners(&bus, Arc::new(TracingBackend::new())).await;
//!
//! publish_contact_event(&bus, &ContactDeleted { id: 7 }).await;
//! # }
//! ```

pub mod backend;
pub mod contacts;
pub mod event;
pub mod listeners;

pub use backend::*;
pub use contacts::*;
pub use event::*;
pub use listeners::*;
