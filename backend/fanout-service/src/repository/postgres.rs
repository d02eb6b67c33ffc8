use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::migrate::Migrator;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{FollowIndex, PostStore, UserDirectory};
use crate::models::{NewPost, Post, UserRole, UserSummary};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const POST_COLUMNS: &str =
    "id, author_id, content, media_url, created_at, seq, like_count, comment_count";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    content: String,
    media_url: Option<String>,
    created_at: i64,
    seq: i64,
    like_count: i64,
    comment_count: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            author_id: row.author_id,
            content: row.content,
            media_url: row.media_url,
            created_at: row.created_at,
            seq: row.seq,
            like_count: row.like_count,
            comment_count: row.comment_count,
        }
    }
}

/// PostgreSQL-backed follow index, post store and user directory
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, verify and migrate
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        info!(max_connections, "PostgreSQL pool ready");
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl FollowIndex for PostgresRepository {
    async fn get_followers(&self, author_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT follower_id FROM follows WHERE followee_id = $1")
                .bind(author_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to load followers")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_following(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT followee_id FROM follows WHERE follower_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to load following")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            RETURNING follower_id
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to create follow")?;

        debug!(%follower_id, %followee_id, created = inserted.is_some(), "follow");
        Ok(inserted.is_some())
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete follow")?
            .rows_affected();

        debug!(%follower_id, %followee_id, removed = affected > 0, "unfollow");
        Ok(affected > 0)
    }
}

#[async_trait::async_trait]
impl PostStore for PostgresRepository {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        let row: PostRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO posts (id, author_id, content, media_url, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_post.author_id)
        .bind(&new_post.content)
        .bind(&new_post.media_url)
        .bind(new_post.created_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert post")?;

        Ok(row.into())
    }

    async fn query_by_authors(
        &self,
        authors: &[Uuid],
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Post>> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM posts
            WHERE author_id = ANY($1)
            ORDER BY created_at DESC, seq DESC
            OFFSET $2 LIMIT $3
            "#,
            POST_COLUMNS
        ))
        .bind(authors)
        .bind(to_sql_offset(offset))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query posts by authors")?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn query_all(&self, offset: u64, limit: u32) -> Result<Vec<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM posts
            ORDER BY created_at DESC, seq DESC
            OFFSET $1 LIMIT $2
            "#,
            POST_COLUMNS
        ))
        .bind(to_sql_offset(offset))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query posts")?;

        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[async_trait::async_trait]
impl UserDirectory for PostgresRepository {
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load user role")?;

        Ok(row.and_then(|(role,)| UserRole::parse(&role)))
    }

    async fn upsert_user(&self, user_id: Uuid, username: &str, role: UserRole) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                role = EXCLUDED.role
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;
        Ok(())
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserSummary>> {
        let rows: Vec<(Uuid, String, i64)> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, COUNT(f.follower_id) AS follower_count
            FROM users u
            LEFT JOIN follows f ON f.followee_id = u.id
            WHERE u.role = $1
            GROUP BY u.id, u.username
            ORDER BY follower_count DESC, u.username ASC
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users by role")?;

        Ok(rows
            .into_iter()
            .map(|(id, username, follower_count)| UserSummary {
                id,
                username,
                role,
                follower_count,
            })
            .collect())
    }
}

fn to_sql_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}
