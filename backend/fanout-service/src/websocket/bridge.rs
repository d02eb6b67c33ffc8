use event_bus::EventBus;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::models::FanoutEvent;

/// How long the bridge waits for room in the dispatch channel before dropping
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

/// Subscribe to `topic` and forward decoded events into the dispatch channel.
///
/// The first subscription happens before this returns so a dead transport
/// fails startup. If the stream later ends (transport reconnect), the bridge
/// resubscribes until the dispatch side goes away; events published in the
/// gap are lost, which feed reads cover.
pub async fn spawn_bus_bridge(
    bus: Arc<dyn EventBus>,
    topic: String,
    dispatch: mpsc::Sender<FanoutEvent>,
) -> event_bus::Result<JoinHandle<()>> {
    let mut stream = bus.subscribe(&topic).await?;
    info!(topic = %topic, transport = bus.name(), "Subscribed to fan-out topic");

    Ok(tokio::spawn(async move {
        loop {
            while let Some(payload) = stream.next().await {
                if !forward(&payload, &dispatch).await {
                    info!("Dispatch channel closed; bus bridge exiting");
                    return;
                }
            }

            if dispatch.is_closed() {
                return;
            }
            warn!(topic = %topic, "Fan-out subscription ended; resubscribing");

            stream = loop {
                tokio::time::sleep(RESUBSCRIBE_BACKOFF).await;
                if dispatch.is_closed() {
                    return;
                }
                match bus.subscribe(&topic).await {
                    Ok(stream) => break stream,
                    Err(e) => error!(topic = %topic, error = %e, "Resubscribe failed"),
                }
            };
        }
    }))
}

/// Returns false once the dispatch channel is closed.
async fn forward(payload: &str, dispatch: &mpsc::Sender<FanoutEvent>) -> bool {
    let event = match FanoutEvent::from_json(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping malformed fan-out event");
            return true;
        }
    };
    let event_id = event.event_id;

    match dispatch.send_timeout(event, ENQUEUE_TIMEOUT).await {
        Ok(()) => {
            debug!(%event_id, "Event handed to dispatcher");
            true
        }
        Err(SendTimeoutError::Timeout(_)) => {
            metrics::record_delivery("dispatch_overflow");
            warn!(%event_id, "Dispatch channel full; event dropped");
            true
        }
        Err(SendTimeoutError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use event_bus::InMemoryEventBus;
    use uuid::Uuid;

    fn event() -> FanoutEvent {
        FanoutEvent::new(
            Post {
                id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                content: "x".to_string(),
                media_url: None,
                created_at: 1,
                seq: 1,
                like_count: 0,
                comment_count: 0,
            },
            vec![Uuid::new_v4()],
        )
    }

    #[tokio::test]
    async fn test_bridge_forwards_and_skips_malformed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _bridge = spawn_bus_bridge(bus.clone(), "new_post".to_string(), tx)
            .await
            .unwrap();

        let good = event();
        bus.publish("new_post", "{not json".to_string()).await.unwrap();
        bus.publish("new_post", good.to_json().unwrap()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, good);
    }

    #[tokio::test]
    async fn test_full_dispatch_channel_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let payload = event().to_json().unwrap();

        assert!(forward(&payload, &tx).await);
        let started = std::time::Instant::now();
        assert!(forward(&payload, &tx).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_bridge_exits_when_dispatch_closes() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = mpsc::channel(1);
        let bridge = spawn_bus_bridge(bus.clone(), "new_post".to_string(), tx)
            .await
            .unwrap();
        drop(rx);

        bus.publish("new_post", event().to_json().unwrap()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), bridge)
            .await
            .expect("bridge did not exit")
            .unwrap();
    }
}
