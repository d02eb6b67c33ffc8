use fanout_service::config::FeedConfig;
use fanout_service::models::{NewPost, Post};
use fanout_service::repository::{FollowIndex, InMemoryRepository, PostStore};
use fanout_service::services::FeedAggregator;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

async fn write_post(repo: &InMemoryRepository, author: Uuid, created_at: i64) -> Post {
    repo.insert(NewPost {
        author_id: author,
        content: format!("{} @ {}", author, created_at),
        media_url: None,
        created_at,
    })
    .await
    .unwrap()
}

fn aggregator(repo: &Arc<InMemoryRepository>) -> FeedAggregator {
    FeedAggregator::new(repo.clone(), repo.clone(), FeedConfig::default())
}

/// U follows A (12 posts) and B (3 posts), all timestamps distinct.
async fn two_author_fixture() -> (Arc<InMemoryRepository>, Uuid, Vec<Post>) {
    let repo = Arc::new(InMemoryRepository::new());
    let (reader, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    repo.follow(reader, a).await.unwrap();
    repo.follow(reader, b).await.unwrap();

    let mut all = Vec::new();
    for i in 0..12 {
        all.push(write_post(&repo, a, 1_000 + i * 10).await);
    }
    for i in 0..3 {
        all.push(write_post(&repo, b, 1_005 + i * 10).await);
    }
    // Noise from an author nobody here follows
    write_post(&repo, Uuid::new_v4(), 5_000).await;

    all.sort_by(Post::feed_order);
    (repo, reader, all)
}

#[tokio::test]
async fn test_two_pages_cover_combined_feed() {
    let (repo, reader, expected) = two_author_fixture().await;
    let feed = aggregator(&repo);

    let first = feed
        .get_feed(reader, feed.page_request(Some(1), Some(10)))
        .await
        .unwrap();
    assert_eq!(first.posts.len(), 10);
    assert!(first.has_more);
    assert_eq!(first.posts, expected[..10].to_vec());

    let second = feed
        .get_feed(reader, feed.page_request(Some(2), Some(10)))
        .await
        .unwrap();
    assert_eq!(second.posts.len(), 5);
    assert!(!second.has_more);
    assert_eq!(second.posts, expected[10..].to_vec());
}

#[tokio::test]
async fn test_walking_pages_yields_each_post_once() {
    let (repo, reader, expected) = two_author_fixture().await;
    let feed = aggregator(&repo);

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut page = 1;
    loop {
        let result = feed
            .get_feed(reader, feed.page_request(Some(page), Some(4)))
            .await
            .unwrap();
        for post in &result.posts {
            assert!(seen.insert(post.id), "duplicate post {}", post.id);
        }
        ordered.extend(result.posts.clone());
        if !result.has_more {
            break;
        }
        page += 1;
    }

    assert_eq!(ordered, expected);
    let timestamps: Vec<i64> = ordered.iter().map(|p| p.created_at).collect();
    assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_equal_timestamps_paginate_deterministically() {
    let repo = Arc::new(InMemoryRepository::new());
    let (reader, author) = (Uuid::new_v4(), Uuid::new_v4());
    repo.follow(reader, author).await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(write_post(&repo, author, 42).await.id);
    }
    let feed = aggregator(&repo);

    let mut walked = Vec::new();
    for page in 1..=5 {
        let result = feed
            .get_feed(reader, feed.page_request(Some(page), Some(1)))
            .await
            .unwrap();
        walked.extend(result.posts.iter().map(|p| p.id));
    }

    ids.reverse();
    assert_eq!(walked, ids);
}

#[tokio::test]
async fn test_repeated_reads_are_identical() {
    let (repo, reader, _) = two_author_fixture().await;
    let feed = aggregator(&repo);
    let request = feed.page_request(Some(1), Some(10));

    let first = feed.get_feed(reader, request).await.unwrap();
    let second = feed.get_feed(reader, request).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let (repo, reader, _) = two_author_fixture().await;
    let feed = aggregator(&repo);

    let page = feed
        .get_feed(reader, feed.page_request(Some(99), Some(10)))
        .await
        .unwrap();
    assert!(page.posts.is_empty());
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_exactly_full_last_page_reports_has_more() {
    let repo = Arc::new(InMemoryRepository::new());
    let (reader, author) = (Uuid::new_v4(), Uuid::new_v4());
    repo.follow(reader, author).await.unwrap();
    for i in 0..10 {
        write_post(&repo, author, i).await;
    }
    let feed = aggregator(&repo);

    let first = feed
        .get_feed(reader, feed.page_request(Some(1), Some(10)))
        .await
        .unwrap();
    assert!(first.has_more);

    let second = feed
        .get_feed(reader, feed.page_request(Some(2), Some(10)))
        .await
        .unwrap();
    assert!(second.posts.is_empty());
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_unfollow_removes_author_from_feed() {
    let (repo, reader, _) = two_author_fixture().await;
    let feed = aggregator(&repo);
    let following = repo.get_following(reader).await.unwrap();
    for author in following {
        repo.unfollow(reader, author).await.unwrap();
    }

    let page = feed
        .get_feed(reader, feed.page_request(None, None))
        .await
        .unwrap();
    assert!(page.posts.is_empty());
}

#[tokio::test]
async fn test_global_feed_ignores_follow_set() {
    let (repo, _, expected) = two_author_fixture().await;
    let feed = aggregator(&repo);

    let page = feed
        .get_global_feed(feed.page_request(Some(1), Some(100)))
        .await
        .unwrap();
    assert_eq!(page.posts.len(), expected.len() + 1);
    assert_eq!(page.posts[0].created_at, 5_000);
    assert!(!page.has_more);
}
