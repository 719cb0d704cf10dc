//! Health handler.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::http::responses::HealthResponse;
use crate::state::AppState;

/// Health check endpoint, with the current queue backlogs.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        acquisition_backlog: state.acquisition_queue.len(),
        tomography_backlog: state.tomography_queue.len(),
    })
}
