use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::{auth_middleware, metrics_middleware}, problems};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Authenticated API routes
    let api_routes = Router::new()
        .route("/healthcheck", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/problems", post(problems::submit_problem))
        .route("/problems/{id}", delete(problems::delete_problem))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        // Scrapers do not authenticate
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
