use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::models::{StartAttemptRequest, SubmitSessionRequest};
use crate::services::AppState;

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Path(test_id): Path<String>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(%test_id, learner_id = %req.learner_id, "Starting attempt");

    let service = state.attempt_service();
    match service.start_attempt(&test_id, &req.learner_id).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            tracing::error!("Failed to start attempt: {:#}", e);
            Err(map_error(e))
        }
    }
}

pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Json(req): Json<SubmitSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(%attempt_id, answers = req.answers.len(), "Submitting session");

    let service = state.attempt_service();
    match service.submit_session(&attempt_id, req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::error!("Failed to submit session: {:#}", e);
            Err(map_error(e))
        }
    }
}

pub async fn get_insights(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = state.attempt_service();
    match service.insights(&attempt_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(map_error(e)),
    }
}

/// Internal failures surface as a generic retry message; the learner never
/// sees raw remote-service errors.
fn map_error(e: anyhow::Error) -> (StatusCode, String) {
    let msg = format!("{:#}", e);
    if msg.contains("not found") {
        (StatusCode::NOT_FOUND, msg)
    } else if msg.contains("already completed")
        || msg.contains("No answers submitted")
        || msg.contains("for a batch of")
    {
        (StatusCode::CONFLICT, msg)
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong, please try again".to_string(),
        )
    }
}
