/// HTTP handlers for the fan-out service API
pub mod feed;
pub mod identity;
pub mod posts;
pub mod users;
pub mod websocket;

use actix_web::{web, HttpResponse};
use serde_json::json;

pub use identity::{AuthenticatedUser, USER_ID_HEADER};

use crate::state::AppState;

/// GET /health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let directory = state.gateway.directory();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "store": state.store_backend,
        "event_bus": state.bus.name(),
        "open_connections": directory.open_connections(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .route("/ws", web::get().to(websocket::ws_connect))
        .service(
            web::scope("/api/v1")
                .route("/feed", web::get().to(feed::get_feed))
                .route("/feed/global", web::get().to(feed::get_global_feed))
                .route("/posts", web::post().to(posts::create_post))
                .route("/users/celebrities", web::get().to(users::list_celebrities))
                .route("/users/{id}", web::put().to(users::upsert_user))
                .route("/users/{id}/follow", web::post().to(users::follow))
                .route("/users/{id}/follow", web::delete().to(users::unfollow))
                .route("/ws/status/{user_id}", web::get().to(websocket::ws_status))
                .route("/ws/metrics", web::get().to(websocket::ws_metrics)),
        );
}
