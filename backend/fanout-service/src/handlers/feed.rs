use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::identity::AuthenticatedUser;
use crate::error::Result;
use crate::state::AppState;

/// Raw paging parameters. Anything that does not parse as a non-negative
/// integer falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl FeedQuery {
    fn page(&self) -> Option<u32> {
        parse_u32(self.page.as_deref())
    }

    fn limit(&self) -> Option<u32> {
        parse_u32(self.limit.as_deref())
    }
}

fn parse_u32(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
}

/// GET /api/v1/feed
pub async fn get_feed(
    user: AuthenticatedUser,
    query: web::Query<FeedQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let request = state.feed.page_request(query.page(), query.limit());
    let page = state.feed.get_feed(user.0, request).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/feed/global
pub async fn get_global_feed(
    query: web::Query<FeedQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let request = state.feed.page_request(query.page(), query.limit());
    let page = state.feed.get_global_feed(request).await?;
    Ok(HttpResponse::Ok().json(page))
}
