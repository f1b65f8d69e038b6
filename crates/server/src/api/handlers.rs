use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use solvd_core::{HealthReport, SanitizedConfig};

use super::middleware::Caller;
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Health summary; admins also get uptime, connectivity and worker statuses.
///
/// Responds 500 with the same body shape when a dependency is down.
pub async fn health(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.health().check(caller.is_admin()).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<SanitizedConfig>, StatusCode> {
    if !caller.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(state.sanitized_config()))
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
