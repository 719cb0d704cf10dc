//! Task state machine.
//!
//! A task is described by a `(TaskState, TaskStep)` pair. The only legal
//! moves between pairs are the [`Transition`]s below; everything that mutates
//! a task (the submission boundary and the two stage workers) goes through
//! [`Transition::apply`] or the store's compare-and-set built on
//! [`Transition::precondition`] / [`Transition::target`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a Task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task created, nothing submitted yet.
    #[default]
    Plain,
    /// A stage worker owns the task.
    InProgress,
    /// Acquisition finished, waiting for tomography submission.
    Pending,
    /// Tomography finished successfully.
    Done,
    /// A stage failed.
    Failed,
}

impl TaskState {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Stable storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::InProgress => "IN_PROGRESS",
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAIN" => Ok(Self::Plain),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PENDING" => Ok(Self::Pending),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::UnknownValue {
                kind: "task state",
                value: other.to_string(),
            }),
        }
    }
}

/// Last stage a task completed. Ordered: `None < DataAcquisition < Tomography`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStep {
    #[default]
    None,
    DataAcquisition,
    Tomography,
}

impl TaskStep {
    /// Stable storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::DataAcquisition => "DATA_ACQUISITION",
            Self::Tomography => "TOMOGRAPHY",
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStep {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "DATA_ACQUISITION" => Ok(Self::DataAcquisition),
            "TOMOGRAPHY" => Ok(Self::Tomography),
            other => Err(CoreError::UnknownValue {
                kind: "task step",
                value: other.to_string(),
            }),
        }
    }
}

/// Processing stage, one queue and one worker loop each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquisition,
    Tomography,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Tomography => "tomography",
        }
    }

    /// The `(state, step)` a task has while this stage's worker owns it.
    pub fn in_flight(&self) -> (TaskState, TaskStep) {
        match self {
            Self::Acquisition => (TaskState::InProgress, TaskStep::None),
            Self::Tomography => (TaskState::InProgress, TaskStep::DataAcquisition),
        }
    }

    /// Transition applied when the stage fails.
    pub fn failure(&self) -> Transition {
        match self {
            Self::Acquisition => Transition::AcquisitionFailed,
            Self::Tomography => Transition::TomographyFailed,
        }
    }

    /// Transition applied when the stage succeeds.
    pub fn success(&self) -> Transition {
        match self {
            Self::Acquisition => Transition::AcquisitionSucceeded,
            Self::Tomography => Transition::TomographySucceeded,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acquisition" => Ok(Self::Acquisition),
            "tomography" => Ok(Self::Tomography),
            other => Err(CoreError::UnknownValue {
                kind: "stage",
                value: other.to_string(),
            }),
        }
    }
}

/// Every legal edge of the task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    SubmitAcquisition,
    AcquisitionSucceeded,
    AcquisitionFailed,
    SubmitTomography,
    TomographySucceeded,
    TomographyFailed,
}

impl Transition {
    /// The exact `(state, step)` the task must be in.
    pub fn precondition(&self) -> (TaskState, TaskStep) {
        match self {
            Self::SubmitAcquisition => (TaskState::Plain, TaskStep::None),
            Self::AcquisitionSucceeded | Self::AcquisitionFailed => {
                (TaskState::InProgress, TaskStep::None)
            }
            Self::SubmitTomography => (TaskState::Pending, TaskStep::DataAcquisition),
            Self::TomographySucceeded | Self::TomographyFailed => {
                (TaskState::InProgress, TaskStep::DataAcquisition)
            }
        }
    }

    /// The `(state, step)` the task ends up in.
    pub fn target(&self) -> (TaskState, TaskStep) {
        match self {
            Self::SubmitAcquisition => (TaskState::InProgress, TaskStep::None),
            Self::AcquisitionSucceeded => (TaskState::Pending, TaskStep::DataAcquisition),
            Self::AcquisitionFailed => (TaskState::Failed, TaskStep::None),
            Self::SubmitTomography => (TaskState::InProgress, TaskStep::DataAcquisition),
            Self::TomographySucceeded => (TaskState::Done, TaskStep::Tomography),
            Self::TomographyFailed => (TaskState::Failed, TaskStep::DataAcquisition),
        }
    }

    /// Whether the target state is terminal and should stamp `completed_in`.
    pub fn completes(&self) -> bool {
        self.target().0.is_terminal()
    }

    /// Validate the current pair and return the next one.
    pub fn apply(
        &self,
        task_id: &str,
        state: TaskState,
        step: TaskStep,
    ) -> Result<(TaskState, TaskStep), CoreError> {
        let (expected_state, expected_step) = self.precondition();
        if state != expected_state || step != expected_step {
            return Err(CoreError::PreconditionFailed {
                task_id: task_id.to_string(),
                expected_state,
                expected_step,
                actual_state: state,
                actual_step: step,
            });
        }
        Ok(self.target())
    }
}
