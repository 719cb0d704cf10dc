//! Task lifecycle handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use seistomo_core::{Task, TaskId};

use crate::http::responses::{ApiError, CountResponse, ListQuery};
use crate::service;
use crate::state::AppState;

pub async fn create_task(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = service::create_task(&state).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Newest tasks first.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list_tasks(query.limit()).await?))
}

pub async fn count_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.store.count_tasks().await?;
    Ok(Json(CountResponse { count }))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(service::get_task(&state, &TaskId::new(id)).await?))
}

/// Delete a task with its observations, parameters and artifacts.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service::delete_task(&state, &TaskId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
