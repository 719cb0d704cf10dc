//! Observation table handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use seistomo_core::{Detection, Event, ObservationSet, Station, TaskId};

use crate::http::responses::ApiError;
use crate::service;
use crate::state::AppState;

async fn observations(state: &AppState, id: String) -> Result<ObservationSet, ApiError> {
    let id = TaskId::new(id);
    service::get_task(state, &id).await?;
    Ok(state.store.get_observations(&id).await?)
}

pub async fn list_stations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Station>>, ApiError> {
    Ok(Json(observations(&state, id).await?.stations))
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(observations(&state, id).await?.events))
}

pub async fn list_detections(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Detection>>, ApiError> {
    Ok(Json(observations(&state, id).await?.detections))
}
