//! Storage seams for the fan-out core.
//!
//! The follow index and post store are external transactional stores. Reads
//! from them are point-in-time and never wrapped in a cross-store transaction.

use anyhow::Result;
use uuid::Uuid;

use crate::models::{NewPost, Post, UserRole, UserSummary};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Directed follower -> followed edges, unique per pair
#[async_trait::async_trait]
pub trait FollowIndex: Send + Sync {
    /// Everyone currently following `author_id`
    async fn get_followers(&self, author_id: Uuid) -> Result<Vec<Uuid>>;

    /// Everyone `user_id` currently follows
    async fn get_following(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Idempotent; returns true if a new edge was created
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;

    /// Idempotent; returns true if an edge was removed
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
}

/// Append-mostly post storage.
///
/// Query results are ordered by `created_at DESC, seq DESC`.
#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, new_post: NewPost) -> Result<Post>;

    async fn query_by_authors(&self, authors: &[Uuid], offset: u64, limit: u32)
        -> Result<Vec<Post>>;

    async fn query_all(&self, offset: u64, limit: u32) -> Result<Vec<Post>>;
}

/// Known identities and their roles
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` for an identity the system has never seen
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>>;

    async fn upsert_user(&self, user_id: Uuid, username: &str, role: UserRole) -> Result<()>;

    /// Accounts with `role`, most followed first, then by username
    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserSummary>>;
}
