//! Solver artifact handlers.

use std::io::ErrorKind;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use seistomo_core::{SolverArtifact, TaskId};
use tokio_util::io::ReaderStream;

use crate::error::PipelineError;
use crate::http::responses::ApiError;
use crate::state::AppState;

async fn load(state: &AppState, id: String) -> Result<SolverArtifact, ApiError> {
    let id = TaskId::new(id);
    state
        .store
        .get_artifact(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no solver artifacts for task {}", id)))
}

pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SolverArtifact>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// Stream the solver output container.
pub async fn stream_output(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = load(&state, id).await?;
    stream_file(&artifact.output_path).await
}

/// Stream the visualization export, when the solver produced one.
pub async fn stream_export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = load(&state, id).await?;
    let path = artifact
        .export_path
        .ok_or_else(|| ApiError::not_found("solver produced no visualization export"))?;
    stream_file(&path).await
}

async fn stream_file(path: &FsPath) -> Result<Response, ApiError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!(
                "artifact file {} is missing",
                path.display()
            )));
        }
        Err(e) => return Err(PipelineError::Io(e).into()),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
