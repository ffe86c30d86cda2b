use crate::server::handler::{self, AppState};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum router with all map endpoints.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/maps/upload.json", post(handler::upload))
        .route("/maps/merged.json", get(handler::merged_info))
        .route("/maps/merged.sqlite", get(handler::merged_store))
        .route("/maps/merged.png", get(handler::merged_render))
        .route("/maps/:file", get(handler::single_render))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
