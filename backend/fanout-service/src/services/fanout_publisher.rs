/// Fan-out publisher
///
/// Turns a persisted post into exactly one `FanoutEvent` on the event bus,
/// carrying a point-in-time snapshot of the author's followers. Live delivery
/// is an enhancement over the feed read path, so failures here are reported
/// to the caller but never undo the post.
use event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FanoutConfig;
use crate::metrics;
use crate::models::{FanoutEvent, Post};
use crate::repository::FollowIndex;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("follower lookup failed: {0}")]
    FollowerLookup(String),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event bus unavailable after {attempts} attempt(s): {last_error}")]
    BusUnavailable { attempts: u32, last_error: String },
}

impl FanoutError {
    fn metric_label(&self) -> &'static str {
        match self {
            FanoutError::FollowerLookup(_) => "lookup_failed",
            FanoutError::Serialization(_) => "serialization_failed",
            FanoutError::BusUnavailable { .. } => "bus_failed",
        }
    }
}

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReceipt {
    pub event_id: Uuid,
    pub follower_count: usize,
    /// Gateway subscriptions the bus handed the event to
    pub bus_receivers: usize,
}

#[derive(Clone)]
pub struct FanoutPublisher {
    follows: Arc<dyn FollowIndex>,
    bus: Arc<dyn EventBus>,
    config: FanoutConfig,
}

impl FanoutPublisher {
    pub fn new(follows: Arc<dyn FollowIndex>, bus: Arc<dyn EventBus>, config: FanoutConfig) -> Self {
        Self {
            follows,
            bus,
            config,
        }
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Snapshot the author's followers and emit one event for `post`.
    ///
    /// At most `max_publish_attempts` emits are tried back to back, each bounded
    /// by the publish timeout. No inline retry beyond that.
    pub async fn publish(&self, post: &Post) -> Result<FanoutReceipt, FanoutError> {
        let limit = self.config.publish_timeout();

        let followers = match timeout(limit, self.follows.get_followers(post.author_id)).await {
            Ok(Ok(followers)) => followers,
            Ok(Err(e)) => return Err(FanoutError::FollowerLookup(format!("{:#}", e))),
            Err(_) => {
                return Err(FanoutError::FollowerLookup(format!(
                    "timed out after {:?}",
                    limit
                )))
            }
        };

        let event = FanoutEvent::new(post.clone(), followers);
        let payload = event.to_json()?;
        let bus_receivers = self.emit(&payload, limit).await?;

        debug!(
            event_id = %event.event_id,
            post_id = %post.id,
            followers = event.followers.len(),
            bus_receivers,
            "Fan-out event published"
        );

        Ok(FanoutReceipt {
            event_id: event.event_id,
            follower_count: event.followers.len(),
            bus_receivers,
        })
    }

    async fn emit(&self, payload: &str, limit: Duration) -> Result<usize, FanoutError> {
        let attempts = self.config.max_publish_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match timeout(
                limit,
                self.bus.publish(&self.config.topic, payload.to_string()),
            )
            .await
            {
                Ok(Ok(receivers)) => return Ok(receivers),
                Ok(Err(e)) => {
                    let transient = e.is_transient();
                    last_error = e.to_string();
                    debug!(attempt, transient, error = %last_error, "Event bus publish failed");
                    if !transient {
                        return Err(FanoutError::BusUnavailable {
                            attempts: attempt,
                            last_error,
                        });
                    }
                }
                Err(_) => {
                    last_error = format!("publish timed out after {:?}", limit);
                    debug!(attempt, "Event bus publish timed out");
                }
            }
        }

        Err(FanoutError::BusUnavailable {
            attempts,
            last_error,
        })
    }

    /// Entry point for the post-creation path.
    ///
    /// Never fails: a fan-out problem is logged as a warning and surfaced as
    /// `None`, the post stays persisted and reachable through the feed.
    pub async fn on_post_created(&self, post: &Post) -> Option<FanoutReceipt> {
        match self.publish(post).await {
            Ok(receipt) => {
                metrics::record_fanout_publish("ok", receipt.follower_count);
                info!(
                    post_id = %post.id,
                    author_id = %post.author_id,
                    followers = receipt.follower_count,
                    transport = self.bus.name(),
                    "Post fanned out"
                );
                Some(receipt)
            }
            Err(e) => {
                metrics::record_fanout_publish(e.metric_label(), 0);
                warn!(
                    post_id = %post.id,
                    author_id = %post.author_id,
                    error = %e,
                    "Live fan-out skipped; post remains available via feed"
                );
                None
            }
        }
    }
}
