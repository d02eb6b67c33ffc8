//! Topic-based publish/subscribe transport
//!
//! Carries opaque string payloads (JSON by convention) from publishers to every
//! subscriber that is connected at publish time. Delivery is at-most-once per
//! live subscriber; nothing is retained for subscribers that are offline.
//!
//! # Architecture
//!
//! ```text
//! Publisher (post creation path):
//!   1. Persist the post
//!   2. PUBLISH new_post {"author_id": ..., "followers": [...], ...}
//!      ↓
//! Transport (Redis Pub/Sub or in-process broadcast)
//!      ↓
//! Gateway process A, gateway process B, ...:
//!   3. Each subscription receives its own copy
//!   4. Each process fans out to its locally held connections
//! ```
//!
//! # Example
//!
//! ```no_run
//! use event_bus::{EventBus, RedisEventBus};
//! use futures_util::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), event_bus::EventBusError> {
//!     let bus = RedisEventBus::connect("redis://localhost:6379").await?;
//!
//!     let mut stream = bus.subscribe("new_post").await?;
//!     bus.publish("new_post", r#"{"hello":"world"}"#.to_string()).await?;
//!
//!     while let Some(payload) = stream.next().await {
//!         println!("received: {}", payload);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

mod error;
mod memory;
mod redis_bus;

pub use error::EventBusError;
pub use memory::InMemoryEventBus;
pub use redis_bus::RedisEventBus;

pub type Result<T> = std::result::Result<T, EventBusError>;

/// Stream of raw payloads delivered to one subscription.
pub type PayloadStream = BoxStream<'static, String>;

/// Minimal publish/subscribe primitive shared by all transports.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload on `topic`.
    ///
    /// Returns the number of subscriptions the transport handed the payload to.
    /// Zero is not an error: the payload is simply dropped.
    async fn publish(&self, topic: &str, payload: String) -> Result<usize>;

    /// Open a new subscription on `topic`.
    ///
    /// Only payloads published after this call returns are observed.
    async fn subscribe(&self, topic: &str) -> Result<PayloadStream>;

    /// Transport label used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Serialize `message` as JSON and publish it.
pub async fn publish_json<B, T>(bus: &B, topic: &str, message: &T) -> Result<usize>
where
    B: EventBus + ?Sized,
    T: Serialize + Sync,
{
    let payload = serde_json::to_string(message)?;
    bus.publish(topic, payload).await
}

pub(crate) fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.chars().any(|c| c.is_whitespace() || c == '*') {
        return Err(EventBusError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}
