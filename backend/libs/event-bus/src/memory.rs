//! In-process transport backed by `tokio::sync::broadcast`.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::{validate_topic, EventBus, EventBusError, PayloadStream, Result};

const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Process-local event bus.
///
/// Each topic owns a broadcast channel; every subscription gets its own receiver
/// and therefore its own copy of each payload. A subscription that falls more
/// than `capacity` payloads behind skips the overwritten ones.
#[derive(Clone)]
pub struct InMemoryEventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<String>> {
        let mut topics = self.topics.lock().map_err(|_| EventBusError::Closed)?;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).map(|s| s.receiver_count()))
            .unwrap_or(0)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize> {
        validate_topic(topic)?;
        let sender = self.sender(topic)?;
        match sender.send(payload) {
            Ok(receivers) => {
                debug!(topic = %topic, receivers, "Published to in-memory topic");
                Ok(receivers)
            }
            // No live receivers: the payload is dropped, which is the contract.
            Err(_) => Ok(0),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<PayloadStream> {
        validate_topic(topic)?;
        let receiver = self.sender(topic)?.subscribe();
        let topic = topic.to_string();

        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let topic = topic.clone();
            async move {
                match item {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Subscriber lagged, payloads dropped");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
