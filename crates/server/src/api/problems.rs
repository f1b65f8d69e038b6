//! Problem ingress: submissions and deletions are published to the bus and
//! picked up by the orchestrator like any other producer's messages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use solvd_core::{bus::publish_json, protocol::topics, BusError, ProblemDeleted, ProblemSubmission};

use super::middleware::Caller;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a problem.
///
/// Everything except `problemId` is forwarded to the solver untouched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitProblemBody {
    /// Generated when absent.
    #[serde(default)]
    pub problem_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub input_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemAccepted {
    pub problem_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProblemErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ProblemErrorResponse>);

fn bus_error(e: BusError) -> ApiError {
    error!("Failed to publish to bus: {}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ProblemErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Publish a submission to `problem-execute-req`.
pub async fn submit_problem(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(body): Json<SubmitProblemBody>,
) -> Result<(StatusCode, Json<ProblemAccepted>), ApiError> {
    let problem_id = match body.problem_id {
        Some(id) if id.trim().is_empty() => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ProblemErrorResponse {
                    error: "problemId must not be empty".to_string(),
                }),
            ));
        }
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };

    let submission = ProblemSubmission {
        problem_id: problem_id.clone(),
        model_id: body.model_id,
        metadata: body.metadata,
        input_data: body.input_data,
        extra: body.extra,
    };

    publish_json(state.bus(), topics::PROBLEM_EXECUTE_REQ, &submission)
        .await
        .map_err(bus_error)?;

    info!("Problem {} submitted by {}", problem_id, identity.user_id);
    Ok((StatusCode::ACCEPTED, Json(ProblemAccepted { problem_id })))
}

/// Publish a deletion notice to `problem-deleted`.
pub async fn delete_problem(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(problem_id): Path<String>,
) -> Result<(StatusCode, Json<ProblemAccepted>), ApiError> {
    let notice = ProblemDeleted {
        problem_id: problem_id.clone(),
    };

    publish_json(state.bus(), topics::PROBLEM_DELETED, &notice)
        .await
        .map_err(bus_error)?;

    info!("Problem {} deleted by {}", problem_id, identity.user_id);
    Ok((StatusCode::ACCEPTED, Json(ProblemAccepted { problem_id })))
}
