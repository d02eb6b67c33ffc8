use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::identity::AuthenticatedUser;
use crate::error::{AppError, Result};
use crate::models::UserRole;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub username: String,
    pub role: String,
}

/// PUT /api/v1/users/{id}
///
/// Mirrors an account from the identity system so its role is known here.
pub async fn upsert_user(
    path: web::Path<Uuid>,
    body: web::Json<UpsertUserRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let username = body.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username is required".to_string()));
    }
    let role = UserRole::parse(body.role.trim())
        .ok_or_else(|| AppError::BadRequest(format!("unknown role '{}'", body.role)))?;

    state
        .users
        .upsert_user(user_id, username, role)
        .await
        .map_err(AppError::store)?;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "role": role.as_str(),
    })))
}

/// GET /api/v1/users/celebrities
///
/// Discovery list of accounts that publish, most followed first.
pub async fn list_celebrities(state: web::Data<AppState>) -> Result<HttpResponse> {
    let users = state
        .users
        .list_by_role(UserRole::Celebrity)
        .await
        .map_err(AppError::store)?;

    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

/// POST /api/v1/users/{id}/follow
pub async fn follow(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    if followee_id == user.0 {
        return Err(AppError::BadRequest("cannot follow yourself".to_string()));
    }

    // Both ends must be known; the store rejects edges to unknown accounts
    let caller = state.users.role_of(user.0).await.map_err(AppError::store)?;
    if caller.is_none() {
        return Err(AppError::Unauthorized(format!("unknown user {}", user.0)));
    }

    let known = state
        .users
        .role_of(followee_id)
        .await
        .map_err(AppError::store)?;
    if known.is_none() {
        return Err(AppError::NotFound(format!("user {}", followee_id)));
    }

    let created = state
        .follows
        .follow(user.0, followee_id)
        .await
        .map_err(AppError::store)?;
    if created {
        info!(follower_id = %user.0, %followee_id, "Follow created");
    }

    Ok(HttpResponse::Ok().json(json!({
        "following": true,
        "created": created,
    })))
}

/// DELETE /api/v1/users/{id}/follow
pub async fn unfollow(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let removed = state
        .follows
        .unfollow(user.0, followee_id)
        .await
        .map_err(AppError::store)?;

    Ok(HttpResponse::Ok().json(json!({
        "following": false,
        "removed": removed,
    })))
}
