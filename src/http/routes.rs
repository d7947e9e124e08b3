//! Axum router configuration

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::auth::basic_auth;
use super::handlers::{not_found, playlist, root_redirect};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // ServeDir handles Range requests and refuses paths that leave the root.
    let files = ServeDir::new(&state.config.root);

    Router::new()
        .route("/", get(root_redirect))
        .route("/playlist.m3u8", get(playlist))
        .nest_service("/files", files)
        .fallback(not_found)
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
