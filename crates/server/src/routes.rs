//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/nix-cache-info", get(handlers::get_cache_info))
        .route(
            "/nar/{nar_name}",
            get(handlers::get_nar).put(handlers::put_nar),
        )
        // Narinfo and listing routes use a fallback handler since axum
        // doesn't support /{param}.suffix patterns.
        .fallback(handlers::meta_fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
