//! Broker connection seam.
//!
//! The bus needs exactly the pub/sub primitives below. Redis provides them in
//! production; [`MemoryBroker`](crate::memory::MemoryBroker) provides them in
//! tests.

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// A message received on the subscribe connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Raw UTF-8 payload.
    pub payload: String,
}

impl InboundMessage {
    /// Create a new inbound message.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of inbound messages. It ends when the underlying link is lost.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// A live subscribe-side link together with its message stream.
pub struct SubscriberSession {
    /// Command half.
    pub link: Box<dyn SubscribeLink>,
    /// Delivery half.
    pub messages: MessageStream,
}

/// Factory for broker links.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Broker name, reported as `messaging.system` on dispatch spans.
    fn system(&self) -> &str;

    /// Open a publish link.
    async fn connect_publisher(&self) -> Result<Box<dyn PublishLink>>;

    /// Open a subscribe link.
    async fn connect_subscriber(&self) -> Result<SubscriberSession>;
}

/// Publish half of the broker.
#[async_trait]
pub trait PublishLink: Send + Sync {
    /// Send a payload on a channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Close the link gracefully.
    async fn close(&self) -> Result<()>;
}

/// Command half of a subscribe link.
#[async_trait]
pub trait SubscribeLink: Send + Sync {
    /// Subscribe to channels.
    async fn subscribe(&self, channels: &[String]) -> Result<()>;

    /// Unsubscribe from channels.
    async fn unsubscribe(&self, channels: &[String]) -> Result<()>;

    /// Close the link gracefully.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn Broker, _: &dyn PublishLink, _: &dyn SubscribeLink) {}

    #[test]
    fn test_inbound_message_new() {
        let msg = InboundMessage::new("contact.created", "{}");
        assert_eq!(msg.channel, "contact.created");
        assert_eq!(msg.payload, "{}");
    }
}
