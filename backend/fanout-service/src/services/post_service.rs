use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{NewPost, Post, UserRole};
use crate::repository::{PostStore, UserDirectory};

use super::FanoutPublisher;

pub const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    pub post: Post,
    /// False when live fan-out failed; the post is still readable from feeds
    pub fanned_out: bool,
    pub follower_count: usize,
}

/// Write path: validate, persist, then hand the post to the publisher.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    users: Arc<dyn UserDirectory>,
    publisher: FanoutPublisher,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        users: Arc<dyn UserDirectory>,
        publisher: FanoutPublisher,
    ) -> Self {
        Self {
            posts,
            users,
            publisher,
        }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        content: &str,
        media_url: Option<String>,
    ) -> Result<CreatedPost> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("post content is required".to_string()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "post content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        let media_url = media_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        match self
            .users
            .role_of(author_id)
            .await
            .map_err(AppError::store)?
        {
            Some(UserRole::Celebrity) => {}
            Some(_) => {
                return Err(AppError::Forbidden(
                    "only celebrity accounts can publish posts".to_string(),
                ))
            }
            None => return Err(AppError::Unauthorized("unknown author".to_string())),
        }

        let post = self
            .posts
            .insert(NewPost {
                author_id,
                content: content.to_string(),
                media_url,
                created_at: chrono::Utc::now().timestamp_millis(),
            })
            .await
            .map_err(AppError::store)?;

        info!(post_id = %post.id, %author_id, "Post created");

        let receipt = self.publisher.on_post_created(&post).await;
        Ok(CreatedPost {
            fanned_out: receipt.is_some(),
            follower_count: receipt.map(|r| r.follower_count).unwrap_or(0),
            post,
        })
    }
}
