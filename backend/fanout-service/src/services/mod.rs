mod fanout_publisher;
mod feed_aggregator;
mod post_service;

pub use fanout_publisher::{FanoutError, FanoutPublisher, FanoutReceipt};
pub use feed_aggregator::FeedAggregator;
pub use post_service::{CreatedPost, PostService, MAX_CONTENT_CHARS};
