//! Task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::state::{Stage, TaskState, TaskStep};
use crate::TaskId;

/// A Task tracks one network's data through acquisition and tomography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Last completed stage.
    pub step: TaskStep,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task reached a terminal state.
    pub completed_in: Option<DateTime<Utc>>,

    /// Why the task failed, if it did.
    pub failure: Option<FailureReason>,
}

impl Task {
    /// Create a new Task in `Plain/None`.
    pub fn new() -> Self {
        Self {
            id: TaskId::generate(),
            state: TaskState::Plain,
            step: TaskStep::None,
            created_at: Utc::now(),
            completed_in: None,
            failure: None,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of a worker-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UpstreamFetch,
    Parse,
    SolverExecution,
    Storage,
    /// Stage inputs were missing when the worker picked the task up.
    MissingInput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamFetch => "upstream_fetch",
            Self::Parse => "parse",
            Self::SolverExecution => "solver_execution",
            Self::Storage => "storage",
            Self::MissingInput => "missing_input",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upstream_fetch" => Ok(Self::UpstreamFetch),
            "parse" => Ok(Self::Parse),
            "solver_execution" => Ok(Self::SolverExecution),
            "storage" => Ok(Self::Storage),
            "missing_input" => Ok(Self::MissingInput),
            other => Err(CoreError::UnknownValue {
                kind: "failure kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Structured failure recorded on a task when a stage fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_plain() {
        let task = Task::new();
        assert_eq!(task.state, TaskState::Plain);
        assert_eq!(task.step, TaskStep::None);
        assert!(task.completed_in.is_none());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_failure_reason_serializes_snake_case() {
        let reason = FailureReason::new(FailureKind::UpstreamFetch, Stage::Acquisition, "503");
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "upstream_fetch");
        assert_eq!(json["stage"], "acquisition");
    }
}
