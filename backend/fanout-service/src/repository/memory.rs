use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FollowIndex, PostStore, UserDirectory};
use crate::models::{NewPost, Post, UserRole, UserSummary};

struct StoredUser {
    username: String,
    role: UserRole,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, StoredUser>,
    follows: HashSet<(Uuid, Uuid)>,
    posts: Vec<Post>,
    next_seq: i64,
}

/// Process-local store for development and tests
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post_count(&self) -> usize {
        self.inner.read().await.posts.len()
    }
}

#[async_trait::async_trait]
impl FollowIndex for InMemoryRepository {
    async fn get_followers(&self, author_id: Uuid) -> Result<Vec<Uuid>> {
        let inner = self.inner.read().await;
        Ok(inner
            .follows
            .iter()
            .filter(|(_, followee)| *followee == author_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn get_following(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let inner = self.inner.read().await;
        Ok(inner
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect())
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        if follower_id == followee_id {
            bail!("a user cannot follow themselves");
        }
        let mut inner = self.inner.write().await;
        Ok(inner.follows.insert((follower_id, followee_id)))
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.follows.remove(&(follower_id, followee_id)))
    }
}

#[async_trait::async_trait]
impl PostStore for InMemoryRepository {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new_post.author_id,
            content: new_post.content,
            media_url: new_post.media_url,
            created_at: new_post.created_at,
            seq: inner.next_seq,
            like_count: 0,
            comment_count: 0,
        };
        inner.posts.push(post.clone());
        Ok(post)
    }

    async fn query_by_authors(
        &self,
        authors: &[Uuid],
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Post>> {
        let authors: HashSet<&Uuid> = authors.iter().collect();
        let inner = self.inner.read().await;
        let matching = inner
            .posts
            .iter()
            .filter(|p| authors.contains(&p.author_id))
            .cloned()
            .collect();
        Ok(paginate(matching, offset, limit))
    }

    async fn query_all(&self, offset: u64, limit: u32) -> Result<Vec<Post>> {
        let inner = self.inner.read().await;
        Ok(paginate(inner.posts.clone(), offset, limit))
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryRepository {
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>> {
        Ok(self.inner.read().await.users.get(&user_id).map(|u| u.role))
    }

    async fn upsert_user(&self, user_id: Uuid, username: &str, role: UserRole) -> Result<()> {
        self.inner.write().await.users.insert(
            user_id,
            StoredUser {
                username: username.to_string(),
                role,
            },
        );
        Ok(())
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserSummary>> {
        let inner = self.inner.read().await;
        let mut follower_counts: HashMap<Uuid, i64> = HashMap::new();
        for (_, followee) in &inner.follows {
            *follower_counts.entry(*followee).or_default() += 1;
        }

        let mut listed: Vec<UserSummary> = inner
            .users
            .iter()
            .filter(|(_, user)| user.role == role)
            .map(|(id, user)| UserSummary {
                id: *id,
                username: user.username.clone(),
                role: user.role,
                follower_count: follower_counts.get(id).copied().unwrap_or(0),
            })
            .collect();
        listed.sort_by(|a, b| {
            b.follower_count
                .cmp(&a.follower_count)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(listed)
    }
}

fn paginate(mut posts: Vec<Post>, offset: u64, limit: u32) -> Vec<Post> {
    posts.sort_by(Post::feed_order);
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    posts.into_iter().skip(skip).take(limit as usize).collect()
}
