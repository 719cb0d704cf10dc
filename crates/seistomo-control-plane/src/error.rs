//! Pipeline error taxonomy.

use std::path::PathBuf;

use seistomo_core::{CoreError, FailureKind, TaskId};
use seistomo_fdsn::{FetchError, ParseError};
use seistomo_solver::{ContainerError, GridError, SolverError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the submission API and the stage workers.
///
/// `NotFound`, `PreconditionFailed` and `Validation` reach the caller of a
/// submission. Everything else happens inside a worker and ends up as a
/// [`FailureReason`](seistomo_core::FailureReason) on the task.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    PreconditionFailed(CoreError),

    #[error("{0}")]
    Validation(String),

    /// Stage inputs were never persisted.
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] FetchError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("grid preparation failed: {0}")]
    Grid(#[from] GridError),

    #[error("failed to write solver input: {0}")]
    Container(#[from] ContainerError),

    #[error("solver execution failed: {0}")]
    Solver(#[from] SolverError),

    /// The solver exited 0 without producing its output file.
    #[error("solver produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("storage error: {0}")]
    Storage(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Failure classification recorded on the task.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UpstreamFetch(_) => FailureKind::UpstreamFetch,
            Self::Parse(_) => FailureKind::Parse,
            Self::Grid(_) | Self::Solver(_) | Self::MissingOutput(_) => {
                FailureKind::SolverExecution
            }
            Self::MissingInput(_) | Self::Validation(_) => FailureKind::MissingInput,
            Self::NotFound(_)
            | Self::PreconditionFailed(_)
            | Self::Container(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Join(_) => FailureKind::Storage,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Precondition(inner) => Self::PreconditionFailed(inner),
            other => Self::Storage(other),
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TaskNotFound(id) => Self::NotFound(TaskId::new(id)),
            CoreError::PreconditionFailed { .. } => Self::PreconditionFailed(err),
            CoreError::InvalidInput(msg) => Self::Validation(msg),
            CoreError::UnknownValue { .. } => Self::Validation(err.to_string()),
        }
    }
}
