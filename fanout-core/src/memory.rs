//! In-process broker.
//!
//! Behaves like a single pub/sub server: a publish is delivered to every live
//! subscriber session subscribed to the channel at that moment. Faults can be
//! injected and every command is recorded, which makes it the backbone of the
//! bus tests. It also works for local development without Redis.

use crate::broker::{
    Broker, InboundMessage, MessageStream, PublishLink, SubscribeLink, SubscriberSession,
};
use crate::error::{BusError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// A command observed by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SUBSCRIBE` issued on a session.
    Subscribe {
        /// Session id.
        session: u64,
        /// Channel name.
        channel: String,
    },
    /// `UNSUBSCRIBE` issued on a session.
    Unsubscribe {
        /// Session id.
        session: u64,
        /// Channel name.
        channel: String,
    },
}

struct Session {
    id: u64,
    channels: HashSet<String>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Default)]
struct MemoryState {
    sessions: Vec<Session>,
    next_session: u64,
    publisher_connects: usize,
    subscriber_connects: usize,
    fail_connects: u32,
    fail_publishes: u32,
    fail_closes: bool,
    commands: Vec<Command>,
    published: Vec<InboundMessage>,
}

/// In-process pub/sub broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Fail the next `n` connection attempts, publisher or subscriber.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().fail_connects = n;
    }

    /// Fail the next `n` publishes with a connection error.
    pub fn fail_next_publishes(&self, n: u32) {
        self.state.lock().fail_publishes = n;
    }

    /// Make every close (and unsubscribe) fail from now on.
    pub fn fail_closes(&self, fail: bool) {
        self.state.lock().fail_closes = fail;
    }

    /// Drop every live subscriber session, as a broker restart would.
    ///
    /// Their message streams end, which makes subscribers reconnect.
    pub fn drop_subscribers(&self) {
        self.state.lock().sessions.clear();
    }

    /// Push a raw payload to every live session, subscribed or not.
    pub fn deliver_raw(&self, channel: &str, payload: &str) {
        let state = self.state.lock();
        for session in &state.sessions {
            let _ = session.tx.send(InboundMessage::new(channel, payload));
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Successful publisher connections so far.
    pub fn publisher_connects(&self) -> usize {
        self.state.lock().publisher_connects
    }

    /// Successful subscriber connections so far.
    pub fn subscriber_connects(&self) -> usize {
        self.state.lock().subscriber_connects
    }

    /// Ids of the live subscriber sessions.
    pub fn live_sessions(&self) -> Vec<u64> {
        self.state.lock().sessions.iter().map(|s| s.id).collect()
    }

    /// Id of the most recently opened live session.
    pub fn latest_session(&self) -> Option<u64> {
        self.state.lock().sessions.iter().map(|s| s.id).max()
    }

    /// Channels a live session is subscribed to.
    pub fn subscriptions(&self, session: u64) -> HashSet<String> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session)
            .map(|s| s.channels.clone())
            .unwrap_or_default()
    }

    /// Channels a `SUBSCRIBE` was issued for on the given session.
    pub fn subscribe_commands(&self, session: u64) -> HashSet<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::Subscribe { session: s, channel } if *s == session => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every command recorded so far.
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Every message accepted by a publish link.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.state.lock().published.clone()
    }

    fn take_connect_failure(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BusError::Connection("connection refused (injected)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn system(&self) -> &str {
        "memory"
    }

    async fn connect_publisher(&self) -> Result<Box<dyn PublishLink>> {
        self.take_connect_failure()?;
        self.state.lock().publisher_connects += 1;
        Ok(Box::new(MemoryPublishLink {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_subscriber(&self) -> Result<SubscriberSession> {
        self.take_connect_failure()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut state = self.state.lock();
            state.subscriber_connects += 1;
            state.next_session += 1;
            let id = state.next_session;
            state.sessions.push(Session {
                id,
                channels: HashSet::new(),
                tx,
            });
            id
        };

        let messages: MessageStream = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        }));

        Ok(SubscriberSession {
            link: Box::new(MemorySubscribeLink {
                broker: self.clone(),
                session: id,
            }),
            messages,
        })
    }
}

struct MemoryPublishLink {
    broker: MemoryBroker,
    closed: AtomicBool,
}

#[async_trait]
impl PublishLink for MemoryPublishLink {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let mut state = self.broker.state.lock();
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(BusError::Connection("connection reset (injected)".to_string()));
        }

        let message = InboundMessage::new(channel, payload);
        for session in state.sessions.iter().filter(|s| s.channels.contains(channel)) {
            let _ = session.tx.send(message.clone());
        }
        state.published.push(message);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.broker.state.lock().fail_closes {
            return Err(BusError::Connection("close failed (injected)".to_string()));
        }
        Ok(())
    }
}

struct MemorySubscribeLink {
    broker: MemoryBroker,
    session: u64,
}

#[async_trait]
impl SubscribeLink for MemorySubscribeLink {
    async fn subscribe(&self, channels: &[String]) -> Result<()> {
        let mut state = self.broker.state.lock();
        let state = &mut *state;
        let Some(session) = state.sessions.iter_mut().find(|s| s.id == self.session) else {
            return Err(BusError::Connection("session is gone".to_string()));
        };
        for channel in channels {
            session.channels.insert(channel.clone());
            state.commands.push(Command::Subscribe {
                session: self.session,
                channel: channel.clone(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> Result<()> {
        let mut state = self.broker.state.lock();
        let state = &mut *state;
        for channel in channels {
            state.commands.push(Command::Unsubscribe {
                session: self.session,
                channel: channel.clone(),
            });
        }
        if state.fail_closes {
            return Err(BusError::Connection("unsubscribe failed (injected)".to_string()));
        }
        if let Some(session) = state.sessions.iter_mut().find(|s| s.id == self.session) {
            for channel in channels {
                session.channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.broker.state.lock();
        state.sessions.retain(|s| s.id != self.session);
        if state.fail_closes {
            return Err(BusError::Connection("close failed (injected)".to_string()));
        }
        Ok(())
    }
}
