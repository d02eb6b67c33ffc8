use event_bus::{publish_json, EventBus, InMemoryEventBus};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_trait_object_publish_json() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let mut stream = bus.subscribe("new_post").await.unwrap();

    let receivers = publish_json(bus.as_ref(), "new_post", &json!({"post_id": "p1"}))
        .await
        .unwrap();
    assert_eq!(receivers, 1);

    let payload = stream.next().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(value["post_id"], "p1");
    assert_eq!(bus.name(), "memory");
}

#[tokio::test]
async fn test_concurrent_publishers_all_delivered() {
    let bus = InMemoryEventBus::new();
    let mut stream = bus.subscribe("new_post").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let bus = bus.clone();
        handles.push(tokio::spawn(async move {
            bus.publish("new_post", i.to_string()).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }

    let mut seen = Vec::new();
    for _ in 0..8 {
        seen.push(stream.next().await.unwrap().parse::<u32>().unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..8).collect::<Vec<_>>());
}
