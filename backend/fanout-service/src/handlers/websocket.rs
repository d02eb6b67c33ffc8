/// WebSocket endpoints
///
/// `GET /ws` upgrades to the live post channel; the client then sends
/// `{"type":"subscribe","user_id":"..."}` to start receiving `new_post` frames.
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;
use crate::websocket::FeedSocket;

/// GET /ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(FeedSocket::new(state.gateway.clone()), &req, stream)
}

/// GET /api/v1/ws/status/{user_id}
pub async fn ws_status(path: web::Path<Uuid>, state: web::Data<AppState>) -> HttpResponse {
    let user_id = path.into_inner();
    let connection_count = state.gateway.directory().connection_count(user_id);

    HttpResponse::Ok().json(json!({
        "user_id": user_id.to_string(),
        "connected": connection_count > 0,
        "connection_count": connection_count
    }))
}

/// GET /api/v1/ws/metrics
pub async fn ws_metrics(state: web::Data<AppState>) -> HttpResponse {
    let directory = state.gateway.directory();
    let subscribed = directory.subscribed_connections();
    let connected_users = directory.connected_users();

    HttpResponse::Ok().json(json!({
        "open_connections": directory.open_connections(),
        "subscribed_connections": subscribed,
        "connected_users": connected_users,
        "average_connections_per_user": if connected_users > 0 {
            subscribed as f64 / connected_users as f64
        } else {
            0.0
        }
    }))
}
