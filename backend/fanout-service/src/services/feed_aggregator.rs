use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::FeedConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{FeedPage, PageRequest};
use crate::repository::{FollowIndex, PostStore};

/// Pull-based feed reads.
///
/// Every call recomputes the follow set and queries the post store, so the
/// read path needs no live-delivery component to be correct.
#[derive(Clone)]
pub struct FeedAggregator {
    follows: Arc<dyn FollowIndex>,
    posts: Arc<dyn PostStore>,
    config: FeedConfig,
}

impl FeedAggregator {
    pub fn new(follows: Arc<dyn FollowIndex>, posts: Arc<dyn PostStore>, config: FeedConfig) -> Self {
        Self {
            follows,
            posts,
            config,
        }
    }

    /// Build a page request from raw query values, applying the configured defaults.
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        PageRequest::new(
            page.unwrap_or(1),
            page_size.unwrap_or(self.config.default_page_size),
            self.config.max_page_size,
        )
    }

    /// Posts by authors `user_id` follows, newest first.
    ///
    /// A user who follows nobody gets an empty page, never an error.
    pub async fn get_feed(&self, user_id: Uuid, request: PageRequest) -> Result<FeedPage> {
        let result = self.load_feed(user_id, request).await;
        metrics::record_feed_request("personal", result_label(&result));
        result
    }

    async fn load_feed(&self, user_id: Uuid, request: PageRequest) -> Result<FeedPage> {
        let mut authors = self
            .bounded("follow index", self.follows.get_following(user_id))
            .await?;

        if authors.is_empty() {
            debug!(%user_id, "Feed requested with empty follow set");
            return Ok(FeedPage::empty(request));
        }
        authors.sort_unstable();
        authors.dedup();

        let posts = self
            .bounded(
                "post store",
                self.posts
                    .query_by_authors(&authors, request.offset(), request.limit()),
            )
            .await?;

        debug!(
            %user_id,
            authors = authors.len(),
            page = request.page,
            returned = posts.len(),
            "Feed page assembled"
        );
        Ok(FeedPage::from_posts(posts, request))
    }

    /// Every post in the system, same ordering and paging as `get_feed`.
    pub async fn get_global_feed(&self, request: PageRequest) -> Result<FeedPage> {
        let result = self
            .bounded(
                "post store",
                self.posts.query_all(request.offset(), request.limit()),
            )
            .await
            .map(|posts| FeedPage::from_posts(posts, request));
        metrics::record_feed_request("global", result_label(&result));
        result
    }

    async fn bounded<T, F>(&self, store: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match timeout(self.config.read_timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(store, error = %format!("{:#}", e), "Feed read failed");
                Err(AppError::store(format!("{} unavailable", store)))
            }
            Err(_) => {
                warn!(store, timeout_ms = self.config.read_timeout_ms, "Feed read timed out");
                Err(AppError::Timeout(format!("{} read", store)))
            }
        }
    }
}

fn result_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPost, Post};
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;

    struct UnreachableStore;

    /// Follow lookups never complete
    struct HangingFollowIndex;

    #[async_trait]
    impl FollowIndex for HangingFollowIndex {
        async fn get_followers(&self, _author_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
            futures::future::pending().await
        }
        async fn get_following(&self, _user_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
            futures::future::pending().await
        }
        async fn follow(&self, _a: Uuid, _b: Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn unfollow(&self, _a: Uuid, _b: Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[async_trait]
    impl PostStore for UnreachableStore {
        async fn insert(&self, _new_post: NewPost) -> anyhow::Result<Post> {
            anyhow::bail!("connection reset")
        }
        async fn query_by_authors(
            &self,
            _authors: &[Uuid],
            _offset: u64,
            _limit: u32,
        ) -> anyhow::Result<Vec<Post>> {
            anyhow::bail!("connection reset")
        }
        async fn query_all(&self, _offset: u64, _limit: u32) -> anyhow::Result<Vec<Post>> {
            anyhow::bail!("connection reset")
        }
    }

    async fn seed(repo: &InMemoryRepository, author: Uuid, count: i64) {
        for ts in 0..count {
            repo.insert(NewPost {
                author_id: author,
                content: format!("post {}", ts),
                media_url: None,
                created_at: 1_000 + ts,
            })
            .await
            .unwrap();
        }
    }

    fn aggregator(repo: Arc<InMemoryRepository>) -> FeedAggregator {
        FeedAggregator::new(repo.clone(), repo, FeedConfig::default())
    }

    #[tokio::test]
    async fn test_empty_follow_set_returns_empty_page() {
        let repo = Arc::new(InMemoryRepository::new());
        seed(&repo, Uuid::new_v4(), 3).await;
        let feed = aggregator(repo);

        let page = feed
            .get_feed(Uuid::new_v4(), feed.page_request(None, None))
            .await
            .unwrap();
        assert!(page.posts.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 10);
    }

    #[tokio::test]
    async fn test_feed_only_contains_followed_authors() {
        let repo = Arc::new(InMemoryRepository::new());
        let (reader, followed, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        repo.follow(reader, followed).await.unwrap();
        seed(&repo, followed, 2).await;
        seed(&repo, stranger, 2).await;
        let feed = aggregator(repo);

        let page = feed
            .get_feed(reader, feed.page_request(Some(1), Some(10)))
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 2);
        assert!(page.posts.iter().all(|p| p.author_id == followed));
        assert!(page.posts[0].created_at >= page.posts[1].created_at);
    }

    #[tokio::test]
    async fn test_page_request_defaults_and_clamp() {
        let feed = aggregator(Arc::new(InMemoryRepository::new()));
        assert_eq!(feed.page_request(None, None), PageRequest::new(1, 10, 100));
        assert_eq!(feed.page_request(Some(0), Some(1_000)).page_size, 100);
        assert_eq!(feed.page_request(Some(0), Some(1_000)).page, 1);
    }

    #[tokio::test]
    async fn test_global_feed_reads_everything() {
        let repo = Arc::new(InMemoryRepository::new());
        seed(&repo, Uuid::new_v4(), 3).await;
        seed(&repo, Uuid::new_v4(), 4).await;
        let feed = aggregator(repo);

        let page = feed
            .get_global_feed(feed.page_request(Some(1), Some(5)))
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 5);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_store_failure_is_retryable() {
        let repo = Arc::new(InMemoryRepository::new());
        let (reader, author) = (Uuid::new_v4(), Uuid::new_v4());
        repo.follow(reader, author).await.unwrap();
        let feed = FeedAggregator::new(repo, Arc::new(UnreachableStore), FeedConfig::default());

        let err = feed
            .get_feed(reader, feed.page_request(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let err = feed
            .get_global_feed(feed.page_request(None, None))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_follow_index_times_out() {
        let config = FeedConfig {
            read_timeout_ms: 20,
            ..FeedConfig::default()
        };
        let feed = FeedAggregator::new(
            Arc::new(HangingFollowIndex),
            Arc::new(InMemoryRepository::new()),
            config,
        );

        let err = feed
            .get_feed(Uuid::new_v4(), feed.page_request(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
