use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::api::{handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    // CORS configuration; agents load order images cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let maps = ServeDir::new(state.maps_dir.as_path());
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        // Stats endpoint
        .route("/api/stats", get(handlers::get_stats))
        // Order submission
        .route(
            "/updateorders",
            post(handlers::update_orders).layer(upload_limit),
        )
        // Agent command socket
        .route("/api/ws", get(websocket_handler))
        // Order images
        .nest_service("/maps", maps)
        // Everything else is the static site
        .fallback_service(ServeDir::new(static_dir))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
