//! Task persistence.
//!
//! [`TaskStore`] is the only way tasks, their stage inputs, observations and
//! artifacts are read or written. Every state change is a compare-and-set on
//! the task's `(state, step)` pair, and every stage commit writes its data
//! and its transition in one transaction.

use async_trait::async_trait;
use seistomo_core::{
    AcquisitionRequest, CoreError, FailureReason, ObservationBatch, ObservationSet,
    SolverArtifact, Task, TaskId, TomographyParameters, Transition,
};
use thiserror::Error;

mod sqlite;

pub use sqlite::SqliteTaskStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// The task's `(state, step)` did not match the transition.
    #[error(transparent)]
    Precondition(CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates an invariant.
    #[error("integrity error: {0}")]
    Integrity(String),
}

/// Persistence capability used by the submission API and the stage workers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Newest tasks first.
    async fn list_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError>;

    async fn count_tasks(&self) -> Result<u64, StoreError>;

    /// Delete a task and everything it owns. Returns false if it did not exist.
    async fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError>;

    /// Tasks currently `InProgress`, oldest first.
    async fn in_flight_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Apply a transition if the task is in its precondition pair. A failure
    /// reason is recorded when given.
    async fn transition(
        &self,
        id: &TaskId,
        transition: Transition,
        failure: Option<&FailureReason>,
    ) -> Result<Task, StoreError>;

    /// Store the acquisition request and move the task to acquisition.
    async fn submit_acquisition(
        &self,
        id: &TaskId,
        request: &AcquisitionRequest,
    ) -> Result<Task, StoreError>;

    async fn get_acquisition_request(
        &self,
        id: &TaskId,
    ) -> Result<Option<AcquisitionRequest>, StoreError>;

    /// Store tomography parameters and move the task to tomography.
    async fn submit_tomography(
        &self,
        id: &TaskId,
        parameters: &TomographyParameters,
    ) -> Result<Task, StoreError>;

    async fn get_tomography_parameters(
        &self,
        id: &TaskId,
    ) -> Result<Option<TomographyParameters>, StoreError>;

    /// Persist a parsed batch and complete acquisition, all or nothing.
    async fn commit_observations(
        &self,
        id: &TaskId,
        batch: &ObservationBatch,
    ) -> Result<Task, StoreError>;

    async fn get_observations(&self, id: &TaskId) -> Result<ObservationSet, StoreError>;

    /// Record solver artifacts and complete tomography, all or nothing.
    async fn complete_tomography(
        &self,
        id: &TaskId,
        artifact: &SolverArtifact,
    ) -> Result<Task, StoreError>;

    async fn get_artifact(&self, id: &TaskId) -> Result<Option<SolverArtifact>, StoreError>;
}
