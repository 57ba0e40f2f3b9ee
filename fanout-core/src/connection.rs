//! Broker connection management.
//!
//! The bus owns at most one [`PublishConnection`] and one
//! [`SubscribeConnection`] at a time. Both recover from broker failures on
//! their own using the configured [`RetryPolicy`]; nothing here surfaces a
//! connection failure to the bus's callers.

use crate::broker::{Broker, PublishLink, SubscribeLink, SubscriberSession};
use crate::config::RetryPolicy;
use crate::dispatch::Dispatcher;
use crate::error::{BusError, Result};
use crate::registry::HandlerRegistry;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not constructed yet, or torn down.
    Absent,
    /// First connection attempt in progress.
    Connecting,
    /// Link established.
    Connected,
    /// Link lost or attempt failed; waiting to try again.
    Reconnecting,
    /// Closed by shutdown; will not reconnect.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Absent => "absent",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

struct StateCell {
    state: Mutex<ConnectionState>,
    ever_connected: AtomicBool,
}

impl StateCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
            ever_connected: AtomicBool::new(false),
        }
    }

    fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set(&self, state: ConnectionState) {
        if state == ConnectionState::Connected {
            self.ever_connected.store(true, Ordering::Release);
        }
        let mut current = self.state.lock();
        if *current != ConnectionState::Closed {
            *current = state;
        }
    }

    fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    fn attempting(&self) {
        if self.ever_connected.load(Ordering::Acquire) {
            self.set(ConnectionState::Reconnecting);
        } else {
            self.set(ConnectionState::Connecting);
        }
    }
}

fn delay_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Publish side
// ============================================================================

/// Publish-side connection.
///
/// The link is opened on the first send and reopened whenever a send fails
/// with a connection error. A single send gives up after `max_retries`
/// reconnect attempts.
pub struct PublishConnection {
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    max_retries: Option<u32>,
    link: AsyncMutex<Option<Arc<dyn PublishLink>>>,
    state: StateCell,
    closed: AtomicBool,
}

impl PublishConnection {
    pub(crate) fn new(broker: Arc<dyn Broker>, retry: RetryPolicy, max_retries: Option<u32>) -> Self {
        info!(system = %broker.system(), "Initializing broker publisher connection");
        Self {
            broker,
            retry,
            max_retries,
            link: AsyncMutex::new(None),
            state: StateCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Send a payload, reconnecting between attempts when the link fails.
    pub async fn send(&self, channel: &str, payload: &str) -> Result<()> {
        let mut retries: u32 = 0;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(BusError::Closed);
            }

            let result = match self.link().await {
                Ok(link) => {
                    let sent = link.publish(channel, payload).await;
                    if matches!(&sent, Err(e) if e.is_retryable()) {
                        self.invalidate(&link).await;
                    }
                    sent
                }
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if let Some(max) = self.max_retries
                && retries >= max
            {
                return Err(BusError::RetriesExhausted {
                    attempts: retries.saturating_add(1),
                    last: err.to_string(),
                });
            }

            retries = retries.saturating_add(1);
            let delay = self.retry.delay(retries);
            warn!(
                attempt = retries,
                delay_ms = delay_ms(delay),
                error = %err,
                "Broker publisher connection failed. Retrying"
            );
            self.state.set(ConnectionState::Reconnecting);
            tokio::time::sleep(delay).await;
        }
    }

    async fn link(&self) -> Result<Arc<dyn PublishLink>> {
        let mut slot = self.link.lock().await;
        if let Some(link) = slot.as_ref() {
            return Ok(link.clone());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        self.state.attempting();
        match self.broker.connect_publisher().await {
            Ok(link) => {
                let link: Arc<dyn PublishLink> = Arc::from(link);
                *slot = Some(link.clone());
                self.state.set(ConnectionState::Connected);
                info!("Broker publisher connected");
                Ok(link)
            }
            Err(e) => {
                error!(error = %e, "Broker publisher error");
                Err(e)
            }
        }
    }

    async fn invalidate(&self, failed: &Arc<dyn PublishLink>) {
        let mut slot = self.link.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *slot = None;
            debug!("Dropped failed publisher link");
        }
    }

    /// Close the link. Pending and future sends fail with [`BusError::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let link = self.link.lock().await.take();
        self.state.close();
        match link {
            Some(link) => link.close().await,
            None => Ok(()),
        }
    }
}

// ============================================================================
// Subscribe side
// ============================================================================

/// Subscribe-side connection.
///
/// A supervisor task owns the link: it connects, re-subscribes every channel
/// in the registry, feeds inbound messages to the dispatcher, and starts over
/// when the link drops. It only stops on shutdown or when a configured
/// reconnect ceiling is hit.
pub struct SubscribeConnection {
    shared: Arc<SubscribeShared>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct SubscribeShared {
    broker: Arc<dyn Broker>,
    registry: HandlerRegistry,
    retry: RetryPolicy,
    max_retries: Option<u32>,
    link: AsyncMutex<Option<Arc<dyn SubscribeLink>>>,
    state: StateCell,
}

impl SubscribeConnection {
    /// Construct the connection and start its supervisor.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(
        broker: Arc<dyn Broker>,
        registry: HandlerRegistry,
        dispatcher: Dispatcher,
        retry: RetryPolicy,
        max_retries: Option<u32>,
    ) -> Self {
        info!(system = %broker.system(), "Initializing broker subscriber connection");
        let shared = Arc::new(SubscribeShared {
            broker,
            registry,
            retry,
            max_retries,
            link: AsyncMutex::new(None),
            state: StateCell::new(),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(shared.clone().supervise(dispatcher, shutdown_rx));

        Self {
            shared,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Subscribe to a channel on the live link.
    ///
    /// Without a live link this is a no-op: the channel is already in the
    /// registry and is picked up by the next (re)connect.
    pub async fn subscribe(&self, channel: &str) -> Result<()> {
        let link = self.shared.link.lock().await.clone();
        match link {
            Some(link) => link.subscribe(&[channel.to_string()]).await,
            None => {
                debug!(channel = %channel, "Subscriber not connected; subscription deferred");
                Ok(())
            }
        }
    }

    /// Stop reconnecting, unsubscribe `channels`, close the link and wait for
    /// the supervisor to exit.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    pub async fn close(&self, channels: &[String]) -> Result<()> {
        // Receivers may already be gone if the supervisor gave up.
        let _ = self.shutdown.send(true);

        let link = self.shared.link.lock().await.take();
        self.shared.state.close();

        let mut first_error = None;
        if let Some(link) = link {
            if !channels.is_empty()
                && let Err(e) = link.unsubscribe(channels).await
            {
                warn!(error = %e, "Failed to unsubscribe channels during close");
                first_error = Some(e);
            }
            if let Err(e) = link.close().await {
                warn!(error = %e, "Failed to close subscriber link");
                first_error.get_or_insert(e);
            }
        }

        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor
            && let Err(e) = handle.await
        {
            error!(error = %e, "Subscriber supervisor task failed");
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl SubscribeShared {
    async fn supervise(self: Arc<Self>, dispatcher: Dispatcher, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.state.attempting();
            let connected = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.broker.connect_subscriber() => result,
            };

            match connected {
                Ok(session) => {
                    attempt = 0;
                    if self.serve(session, &dispatcher, &mut shutdown).await {
                        break;
                    }
                    warn!("Broker subscriber reconnecting");
                }
                Err(e) => error!(error = %e, "Broker subscriber error"),
            }

            attempt = attempt.saturating_add(1);
            if let Some(max) = self.max_retries
                && attempt > max
            {
                error!(attempts = attempt, "Broker subscriber giving up after reconnect ceiling");
                self.state.close();
                break;
            }

            let delay = self.retry.delay(attempt);
            warn!(
                attempt,
                delay_ms = delay_ms(delay),
                "Broker subscriber connection failed. Retrying"
            );
            self.state.set(ConnectionState::Reconnecting);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Subscriber supervisor stopped");
    }

    /// Drive one live session. Returns `true` when shutdown was requested.
    async fn serve(
        &self,
        session: SubscriberSession,
        dispatcher: &Dispatcher,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let SubscriberSession { link, mut messages } = session;
        let link: Arc<dyn SubscribeLink> = Arc::from(link);

        {
            let mut slot = self.link.lock().await;
            if *shutdown.borrow() {
                return true;
            }
            *slot = Some(link.clone());
        }
        self.state.set(ConnectionState::Connected);
        info!("Broker subscriber connected");

        self.resubscribe(&link).await;

        let requested = loop {
            tokio::select! {
                _ = shutdown.changed() => break true,
                message = messages.next() => match message {
                    Some(message) => {
                        dispatcher.dispatch(message);
                    }
                    None => break false,
                },
            }
        };

        let mut slot = self.link.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &link)) {
            *slot = None;
        }
        requested || *shutdown.borrow()
    }

    async fn resubscribe(&self, link: &Arc<dyn SubscribeLink>) {
        let channels = self.registry.channels();
        if channels.is_empty() {
            return;
        }
        info!(channels = ?channels, "Re-subscribing to channels");
        if let Err(e) = link.subscribe(&channels).await {
            error!(error = %e, "Failed to re-subscribe channels");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Absent.to_string(), "absent");
    }

    #[test]
    fn test_delay_ms_saturates() {
        assert_eq!(delay_ms(Duration::from_millis(150)), 150);
        assert_eq!(delay_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_closed_state_is_sticky() {
        let cell = StateCell::new();
        cell.set(ConnectionState::Connected);
        cell.close();
        cell.set(ConnectionState::Reconnecting);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_publish_connects_lazily_once() {
        let broker = MemoryBroker::new();
        let conn = PublishConnection::new(Arc::new(broker.clone()), fast_retry(), Some(3));
        assert_eq!(broker.publisher_connects(), 0);

        conn.send("a", "1").await.unwrap();
        conn.send("a", "2").await.unwrap();

        assert_eq!(broker.publisher_connects(), 1);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_publish_retries_through_connect_failures() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);
        let conn = PublishConnection::new(Arc::new(broker.clone()), fast_retry(), Some(3));

        conn.send("a", "1").await.unwrap();
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_ceiling() {
        let broker = MemoryBroker::new();
        broker.fail_next_publishes(10);
        let conn = PublishConnection::new(Arc::new(broker.clone()), fast_retry(), Some(3));

        let err = conn.send("a", "1").await.unwrap_err();
        assert!(matches!(err, BusError::RetriesExhausted { attempts: 4, .. }));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_after_close_fails_fast() {
        let broker = MemoryBroker::new();
        let conn = PublishConnection::new(Arc::new(broker.clone()), fast_retry(), Some(3));
        conn.send("a", "1").await.unwrap();

        conn.close().await.unwrap();
        assert!(matches!(conn.send("a", "2").await, Err(BusError::Closed)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(broker.publisher_connects(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_gives_up_with_ceiling() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(100);
        let registry = HandlerRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), "test", "memory");
        let conn = SubscribeConnection::start(
            Arc::new(broker.clone()),
            registry,
            dispatcher,
            fast_retry(),
            Some(2),
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while conn.state() != ConnectionState::Closed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(broker.subscriber_connects(), 0);
        conn.close(&[]).await.unwrap();
    }
}
