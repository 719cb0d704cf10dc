//! Stage submission handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use seistomo_core::{AcquisitionRequest, Task, TaskId, TomographyParameters};

use crate::http::responses::ApiError;
use crate::service;
use crate::state::AppState;

/// Submit the acquisition request; 202 once the task is queued.
pub async fn submit_acquisition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AcquisitionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(request) = payload?;
    let task = service::submit_acquisition(&state, &TaskId::new(id), request).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// Submit tomography parameters; 202 once the task is queued.
pub async fn submit_tomography(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<TomographyParameters>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(parameters) = payload?;
    let task = service::submit_tomography(&state, &TaskId::new(id), parameters).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

pub async fn get_acquisition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AcquisitionRequest>, ApiError> {
    let id = TaskId::new(id);
    state
        .store
        .get_acquisition_request(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no acquisition request for task {}", id)))
}

pub async fn get_tomography(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TomographyParameters>, ApiError> {
    let id = TaskId::new(id);
    state
        .store
        .get_tomography_parameters(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no tomography parameters for task {}", id)))
}
