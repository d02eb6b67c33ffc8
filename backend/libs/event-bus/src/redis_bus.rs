//! Redis Pub/Sub transport.
//!
//! Publishing goes through a shared `ConnectionManager`; every subscription
//! opens its own dedicated pub/sub connection, so two gateway processes on the
//! same topic each receive every payload.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use crate::{validate_topic, EventBus, PayloadStream, Result};

#[derive(Clone)]
pub struct RedisEventBus {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisEventBus {
    /// Connect to Redis at `redis_url` (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        info!("Redis event bus connected");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize> {
        validate_topic(topic)?;
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(topic, payload).await?;

        debug!(topic = %topic, receivers, "Published to Redis channel");
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> Result<PayloadStream> {
        validate_topic(topic)?;
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        info!(topic = %topic, "Subscribed to Redis channel");

        let topic = topic.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = msg.get_payload::<String>();
            let topic = topic.clone();
            async move {
                match payload {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(topic = %topic, error = ?e, "Dropping non-text payload");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
