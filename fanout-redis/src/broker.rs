//! Redis implementation of the fanout broker seam.

use crate::config::RedisConfig;
use crate::error::{RedisError, Result};
use async_trait::async_trait;
use fanout_core::{
    Broker, BusError, InboundMessage, MessageStream, PublishLink, SubscribeLink, SubscriberSession,
};
use futures::StreamExt;
use redis::Client;
use redis::aio::{MultiplexedConnection, PubSubSink};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Redis broker.
///
/// Publishing goes through a multiplexed connection. Subscribing opens a
/// dedicated pub/sub connection split into a command sink and a message
/// stream.
pub struct RedisBroker {
    config: RedisConfig,
    client: Client,
}

impl RedisBroker {
    /// Create a broker. Fails only if the configured URL is invalid; no
    /// connection is opened until the bus asks for one.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let client = Client::open(url).map_err(|e| RedisError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// The broker configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(RedisError::from),
        Err(_) => Err(RedisError::Timeout),
    }
}

#[async_trait]
impl Broker for RedisBroker {
    fn system(&self) -> &str {
        "redis"
    }

    async fn connect_publisher(&self) -> fanout_core::Result<Box<dyn PublishLink>> {
        let conn = bounded(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await?;
        debug!("Opened Redis publisher connection");

        Ok(Box::new(RedisPublishLink {
            conn: Mutex::new(Some(conn)),
            command_timeout: self.config.command_timeout,
        }))
    }

    async fn connect_subscriber(&self) -> fanout_core::Result<SubscriberSession> {
        let pubsub = bounded(self.config.connection_timeout, self.client.get_async_pubsub()).await?;
        let (sink, stream) = pubsub.split();
        debug!("Opened Redis subscriber connection");

        let messages: MessageStream = Box::pin(stream.filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(InboundMessage::new(msg.get_channel_name(), payload)),
                Err(e) => {
                    warn!(
                        channel = %msg.get_channel_name(),
                        error = %e,
                        "Dropping pub/sub message with non-text payload"
                    );
                    None
                }
            }
        }));

        Ok(SubscriberSession {
            link: Box::new(RedisSubscribeLink {
                sink: Mutex::new(Some(sink)),
                command_timeout: self.config.command_timeout,
            }),
            messages,
        })
    }
}

struct RedisPublishLink {
    conn: Mutex<Option<MultiplexedConnection>>,
    command_timeout: Duration,
}

#[async_trait]
impl PublishLink for RedisPublishLink {
    async fn publish(&self, channel: &str, payload: &str) -> fanout_core::Result<()> {
        let mut conn = self.conn.lock().await.clone().ok_or(BusError::Closed)?;

        let receivers: i64 = bounded(
            self.command_timeout,
            redis::cmd("PUBLISH")
                .arg(channel)
                .arg(payload)
                .query_async(&mut conn),
        )
        .await?;

        debug!(channel = %channel, receivers, "Published message");
        Ok(())
    }

    async fn close(&self) -> fanout_core::Result<()> {
        // Dropping the last handle shuts the multiplexed connection down.
        self.conn.lock().await.take();
        Ok(())
    }
}

struct RedisSubscribeLink {
    sink: Mutex<Option<PubSubSink>>,
    command_timeout: Duration,
}

impl RedisSubscribeLink {
    async fn sink(&self) -> fanout_core::Result<PubSubSink> {
        self.sink.lock().await.clone().ok_or(BusError::Closed)
    }
}

#[async_trait]
impl SubscribeLink for RedisSubscribeLink {
    async fn subscribe(&self, channels: &[String]) -> fanout_core::Result<()> {
        let mut sink = self.sink().await?;
        bounded(self.command_timeout, sink.subscribe(channels)).await?;
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> fanout_core::Result<()> {
        let mut sink = self.sink().await?;
        bounded(self.command_timeout, sink.unsubscribe(channels)).await?;
        Ok(())
    }

    async fn close(&self) -> fanout_core::Result<()> {
        // The connection closes once both the sink and the message stream
        // are dropped; the stream goes when the subscriber stops reading.
        self.sink.lock().await.take();
        Ok(())
    }
}
