//! HTTP request and response types.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::PipelineError;
use crate::store::StoreError;

// ============================================================================
// Task list types
// ============================================================================

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Query string for `GET /v1/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

/// Response for `GET /v1/tasks/count`.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

// ============================================================================
// Health types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub acquisition_backlog: usize,
    pub tomography_backlog: usize,
}

// ============================================================================
// Error types
// ============================================================================

/// Error envelope: `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let (status, kind) = match &err {
            PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PipelineError::PreconditionFailed(_) => {
                (StatusCode::CONFLICT, "precondition_failed")
            }
            PipelineError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        };
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        }
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        PipelineError::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: "validation",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: ErrorDetail {
                    kind: self.kind,
                    message: self.message,
                },
            }),
        )
            .into_response()
    }
}
