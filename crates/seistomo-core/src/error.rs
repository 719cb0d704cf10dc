//! Core domain errors.

use thiserror::Error;

use crate::state::{TaskState, TaskStep};

/// Core domain errors for seistomo.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The task is not in the (state, step) a submission or worker requires.
    #[error(
        "Task {task_id} is {actual_state}/{actual_step}, expected {expected_state}/{expected_step}"
    )]
    PreconditionFailed {
        task_id: String,
        expected_state: TaskState,
        expected_step: TaskStep,
        actual_state: TaskState,
        actual_step: TaskStep,
    },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown enum value read back from storage or the wire.
    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },
}
