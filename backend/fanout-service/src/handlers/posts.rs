use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::identity::AuthenticatedUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default, alias = "mediaUrl")]
    pub media_url: Option<String>,
}

/// POST /api/v1/posts
///
/// Celebrity accounts only. Responds once the post is durable; live fan-out
/// outcome is reported but never fails the request.
pub async fn create_post(
    user: AuthenticatedUser,
    body: web::Json<CreatePostRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let created = state
        .posts
        .create_post(user.0, &body.content, body.media_url)
        .await?;
    Ok(HttpResponse::Created().json(created))
}
