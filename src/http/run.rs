use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::{
    core::{domain::ExecRequest, service::ExecutionError},
    http::AppState,
};

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub output: String,
    pub error: Option<String>,
}

/// Runs a request to completion without input and returns everything it printed.
#[tracing::instrument(skip_all)]
pub async fn run_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecRequest>,
) -> (StatusCode, Json<RunResponse>) {
    let collected = state.service.execute(request).await;

    let status = match &collected.result {
        Ok(()) => StatusCode::OK,
        Err(ExecutionError::Invalid(_)) => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let response = RunResponse {
        output: collected.output,
        error: collected.result.err().map(|e| e.to_string()),
    };
    (status, Json(response))
}
