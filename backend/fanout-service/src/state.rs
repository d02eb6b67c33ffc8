use event_bus::EventBus;
use std::sync::Arc;

use crate::config::Config;
use crate::repository::{FollowIndex, PostStore, UserDirectory};
use crate::services::{FanoutPublisher, FeedAggregator, PostService};
use crate::websocket::DeliveryGateway;

/// Shared handles injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub follows: Arc<dyn FollowIndex>,
    pub users: Arc<dyn UserDirectory>,
    pub feed: FeedAggregator,
    pub posts: PostService,
    pub gateway: Arc<DeliveryGateway>,
    pub bus: Arc<dyn EventBus>,
    pub store_backend: &'static str,
}

impl AppState {
    /// Wire the core services over one repository implementing every store seam.
    pub fn build<R>(repo: Arc<R>, bus: Arc<dyn EventBus>, config: &Config, store_backend: &'static str) -> Self
    where
        R: FollowIndex + PostStore + UserDirectory + 'static,
    {
        let follows: Arc<dyn FollowIndex> = repo.clone();
        let posts: Arc<dyn PostStore> = repo.clone();
        let users: Arc<dyn UserDirectory> = repo;

        let publisher = FanoutPublisher::new(follows.clone(), bus.clone(), config.fanout.clone());
        let feed = FeedAggregator::new(follows.clone(), posts.clone(), config.feed.clone());
        let post_service = PostService::new(posts, users.clone(), publisher);
        let gateway = Arc::new(DeliveryGateway::new(users.clone(), config.gateway.clone()));

        Self {
            follows,
            users,
            feed,
            posts: post_service,
            gateway,
            bus,
            store_backend,
        }
    }
}
