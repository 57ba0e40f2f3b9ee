//! Event bus: publish, subscribe and shutdown.

use crate::broker::Broker;
use crate::config::BusConfig;
use crate::connection::{ConnectionState, PublishConnection, SubscribeConnection};
use crate::dispatch::Dispatcher;
use crate::error::{BusError, Result};
use crate::handler::EventHandler;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Process-scoped event bus.
///
/// Owns the publish and subscribe connections and the handler registry.
/// Create one at startup, hand clones to whoever needs to publish or
/// subscribe, and call [`EventBus::disconnect`] once at shutdown.
///
/// Nothing on this type returns an error to the caller: failures are logged
/// and the message is dropped. Use [`EventBus::try_publish`] when the outcome
/// of a publish matters.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    broker: Arc<dyn Broker>,
    registry: HandlerRegistry,
    terminating: AtomicBool,
    publisher: Mutex<Option<Arc<PublishConnection>>>,
    subscriber: Mutex<Option<Arc<SubscribeConnection>>>,
}

impl EventBus {
    /// Create a bus over the given broker with default configuration.
    pub fn new<B: Broker>(broker: B) -> Self {
        Self::with_config(broker, BusConfig::default())
    }

    /// Create a bus with custom configuration.
    pub fn with_config<B: Broker>(broker: B, config: BusConfig) -> Self {
        Self::from_shared(Arc::new(broker), config)
    }

    /// Create a bus over an already shared broker.
    pub fn from_shared(broker: Arc<dyn Broker>, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                broker,
                registry: HandlerRegistry::new(),
                terminating: AtomicBool::new(false),
                publisher: Mutex::new(None),
                subscriber: Mutex::new(None),
            }),
        }
    }

    /// Bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Whether shutdown has begun.
    pub fn is_terminating(&self) -> bool {
        self.inner.terminating.load(Ordering::Acquire)
    }

    /// Snapshot of the channels with a registered handler.
    pub fn channels(&self) -> Vec<String> {
        self.inner.registry.channels()
    }

    /// State of the publish connection.
    pub fn publisher_state(&self) -> ConnectionState {
        self.inner
            .publisher
            .lock()
            .as_ref()
            .map_or(ConnectionState::Absent, |conn| conn.state())
    }

    /// State of the subscribe connection.
    pub fn subscriber_state(&self) -> ConnectionState {
        self.inner
            .subscriber
            .lock()
            .as_ref()
            .map_or(ConnectionState::Absent, |conn| conn.state())
    }

    /// The publish connection, constructed on first call.
    ///
    /// Returns `None` once shutdown has begun. The termination flag is read
    /// under the same lock `disconnect` takes the connection with, so no
    /// connection can be created after shutdown starts.
    pub fn publish_connection(&self) -> Option<Arc<PublishConnection>> {
        let mut slot = self.inner.publisher.lock();
        if self.is_terminating() {
            return None;
        }
        let conn = slot.get_or_insert_with(|| {
            Arc::new(PublishConnection::new(
                self.inner.broker.clone(),
                self.inner.config.retry,
                self.inner.config.publish_max_retries,
            ))
        });
        Some(conn.clone())
    }

    /// The subscribe connection, constructed (and its supervisor started) on
    /// first call. Returns `None` once shutdown has begun.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_connection(&self) -> Option<Arc<SubscribeConnection>> {
        let mut slot = self.inner.subscriber.lock();
        if self.is_terminating() {
            return None;
        }
        let conn = slot.get_or_insert_with(|| {
            let dispatcher = Dispatcher::new(
                self.inner.registry.clone(),
                self.inner.config.service_name.clone(),
                self.inner.broker.system().to_string(),
            );
            Arc::new(SubscribeConnection::start(
                self.inner.broker.clone(),
                self.inner.registry.clone(),
                dispatcher,
                self.inner.config.retry,
                self.inner.config.subscribe_max_retries,
            ))
        });
        Some(conn.clone())
    }

    /// Publish a payload on a channel. Best effort; never fails.
    ///
    /// During shutdown this is a logged no-op.
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, payload: &T) {
        match self.try_publish(channel, payload).await {
            Ok(()) => debug!(channel = %channel, "Published event to channel"),
            Err(BusError::ShuttingDown) => warn!(
                channel = %channel,
                "Attempted to publish event during shutdown. Skipping"
            ),
            Err(e) => error!(channel = %channel, error = %e, "Failed to publish event"),
        }
    }

    /// Publish an already decoded JSON document.
    pub async fn publish_value(&self, channel: &str, payload: Value) {
        self.publish(channel, &payload).await;
    }

    /// Publish and report the outcome instead of logging it.
    pub async fn try_publish<T: Serialize + ?Sized>(&self, channel: &str, payload: &T) -> Result<()> {
        if channel.is_empty() {
            return Err(BusError::InvalidChannel(channel.to_string()));
        }
        if self.is_terminating() {
            return Err(BusError::ShuttingDown);
        }

        let message = serde_json::to_string(payload)?;
        let conn = self.publish_connection().ok_or(BusError::ShuttingDown)?;
        conn.send(channel, &message).await
    }

    /// Register `handler` for `channel` and subscribe to it.
    ///
    /// A second registration for the same channel replaces the first and logs
    /// a warning. Registration is refused once shutdown has begun.
    pub async fn subscribe<H: EventHandler + 'static>(&self, channel: &str, handler: H) {
        self.subscribe_shared(channel, Arc::new(handler)).await;
    }

    /// Register an already shared handler.
    pub async fn subscribe_shared(&self, channel: &str, handler: Arc<dyn EventHandler>) {
        if channel.is_empty() {
            warn!("Refusing to subscribe a handler to an empty channel name");
            return;
        }
        let Some(conn) = self.subscribe_connection() else {
            warn!(channel = %channel, "Attempted to subscribe during shutdown. Skipping");
            return;
        };

        self.inner.registry.insert(channel, handler);
        if let Err(e) = conn.subscribe(channel).await {
            // The next reconnect re-subscribes everything in the registry.
            error!(channel = %channel, error = %e, "Failed to subscribe to channel");
            return;
        }
        info!(channel = %channel, "Subscribed handler to channel");
    }

    /// Shut the bus down.
    ///
    /// Sets the termination flag first, then unsubscribes every registered
    /// channel, closes both connections and waits for all of it. Close
    /// failures are logged and do not stop the rest of the teardown. Safe to
    /// call more than once and when nothing was ever connected.
    pub async fn disconnect(&self) {
        self.inner.terminating.store(true, Ordering::Release);
        info!("Disconnecting broker clients");

        let channels = self.inner.registry.channels();
        let subscriber = self.inner.subscriber.lock().take();
        let publisher = self.inner.publisher.lock().take();

        let close_subscriber = async {
            if let Some(conn) = subscriber
                && let Err(e) = conn.close(&channels).await
            {
                error!(error = %e, "Error closing broker subscriber");
            }
        };
        let close_publisher = async {
            if let Some(conn) = publisher
                && let Err(e) = conn.close().await
            {
                error!(error = %e, "Error closing broker publisher");
            }
        };
        futures::join!(close_subscriber, close_publisher);

        self.inner.registry.clear();
        info!("Broker clients disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::HandlerError;
    use crate::handler::handler_fn;
    use crate::memory::MemoryBroker;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_bus(broker: &MemoryBroker) -> EventBus {
        let config = BusConfig::builder()
            .service_name("test")
            .retry(RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5)))
            .build();
        EventBus::with_config(broker.clone(), config)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_fresh_bus_has_no_connections() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);

        assert_eq!(bus.publisher_state(), ConnectionState::Absent);
        assert_eq!(bus.subscriber_state(), ConnectionState::Absent);
        assert!(bus.channels().is_empty());
        assert!(!bus.is_terminating());
    }

    #[tokio::test]
    async fn test_publish_connection_is_memoized() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);

        let first = bus.publish_connection().unwrap();
        bus.publish("a", &json!(1)).await;
        bus.publish("a", &json!(2)).await;
        let second = bus.clone().publish_connection().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.publisher_connects(), 1);
        assert_eq!(broker.published().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_encodes_json() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);

        bus.publish("contact.deleted", &json!({"id": 7})).await;
        assert_eq!(broker.published()[0].payload, r#"{"id":7}"#);
    }

    #[tokio::test]
    async fn test_empty_channel_is_rejected() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);

        assert!(matches!(
            bus.try_publish("", &json!(1)).await,
            Err(BusError::InvalidChannel(_))
        ));
        bus.subscribe("", handler_fn(|_| async { Ok::<(), HandlerError>(()) }))
            .await;
        assert!(bus.channels().is_empty());
        assert_eq!(bus.publisher_state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let broker = MemoryBroker::new();
        broker.fail_next_publishes(100);
        let bus = test_bus(&broker);

        bus.publish("a", &json!(1)).await;
        assert!(matches!(
            bus.try_publish("a", &json!(1)).await,
            Err(BusError::RetriesExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_registers_and_subscribes() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.subscribe(
            "contact.created",
            handler_fn(move |payload| {
                let tx = tx.clone();
                async move { tx.send(payload).map_err(|e| HandlerError::Failed(e.to_string())) }
            }),
        )
        .await;

        eventually(|| {
            broker
                .latest_session()
                .is_some_and(|id| broker.subscriptions(id).contains("contact.created"))
        })
        .await;
        assert_eq!(bus.subscriber_state(), ConnectionState::Connected);

        bus.publish("contact.created", &json!({"id": 1, "name": "Ann"})).await;
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, json!({"id": 1, "name": "Ann"}));
    }

    #[tokio::test]
    async fn test_disconnect_without_activity_is_noop() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);

        bus.disconnect().await;
        bus.disconnect().await;

        assert!(bus.is_terminating());
        assert_eq!(broker.publisher_connects(), 0);
        assert_eq!(broker.subscriber_connects(), 0);
    }

    #[tokio::test]
    async fn test_no_connection_created_after_disconnect() {
        let broker = MemoryBroker::new();
        let bus = test_bus(&broker);
        bus.disconnect().await;

        bus.publish("a", &json!(1)).await;
        bus.subscribe("a", handler_fn(|_| async { Ok::<(), HandlerError>(()) }))
            .await;

        assert!(bus.publish_connection().is_none());
        assert!(bus.subscribe_connection().is_none());
        assert_eq!(bus.publisher_state(), ConnectionState::Absent);
        assert_eq!(bus.subscriber_state(), ConnectionState::Absent);
        assert!(matches!(
            bus.try_publish("a", &json!(1)).await,
            Err(BusError::ShuttingDown)
        ));
    }
}
