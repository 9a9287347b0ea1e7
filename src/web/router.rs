use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use super::app_state::AppState;
use super::rest_api;

/// Build the axum router with all HTTP routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // The HTTP surface is anonymous and read-only; draft mutation happens
    // over the TCP protocol. Open CORS keeps locally served frontends and
    // tournament overlays working without configuration.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/champions", axum::routing::get(rest_api::get_champions))
        .route(
            "/api/draft/default-room",
            axum::routing::get(rest_api::get_default_room),
        )
        .route(
            "/api/draft/{room_id}",
            axum::routing::get(rest_api::get_draft_snapshot),
        )
        // Static files with SPA fallback — unmatched routes serve index.html
        .fallback_service(ServeDir::new("static").fallback(ServeFile::new("static/index.html")))
        .layer(cors)
        .with_state(state)
}
