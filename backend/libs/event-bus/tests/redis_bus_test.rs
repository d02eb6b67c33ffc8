//! Integration tests for the Redis transport
//!
//! These tests require a running Redis instance.
//! Run with: cargo test -p event-bus --test redis_bus_test -- --ignored

use event_bus::{publish_json, EventBus, RedisEventBus};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Ping {
    seq: u32,
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_two_subscriptions_each_receive_payload() {
    let bus = RedisEventBus::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");
    let topic = "event_bus_test:fanout";

    let mut first = bus.subscribe(topic).await.expect("subscribe");
    let mut second = bus.subscribe(topic).await.expect("subscribe");

    // Give subscriptions time to register server-side
    tokio::time::sleep(Duration::from_millis(100)).await;

    let receivers = publish_json(&bus, topic, &Ping { seq: 7 })
        .await
        .expect("Failed to publish");
    assert!(receivers >= 2, "expected both subscriptions to receive");

    for stream in [&mut first, &mut second] {
        let payload = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for payload")
            .expect("stream ended");
        let ping: Ping = serde_json::from_str(&payload).unwrap();
        assert_eq!(ping, Ping { seq: 7 });
    }
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_publish_without_subscribers_returns_zero() {
    let bus = RedisEventBus::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");

    let receivers = bus
        .publish("event_bus_test:nobody", "dropped".to_string())
        .await
        .expect("Failed to publish");
    assert_eq!(receivers, 0);
}
