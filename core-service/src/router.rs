use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::pages;
use crate::session::session_layer;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(pages::index))
        .route("/auth", get(pages::auth))
        .route("/success", get(pages::success))
        .route("/upload", post(handlers::upload))
        .route("/authorize", post(handlers::authorize))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/signout", post(handlers::sign_out))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(session_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
