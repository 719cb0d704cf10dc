//! Submission boundary.
//!
//! Each submission validates its payload, lets the store compare-and-set the
//! task into the stage's in-flight pair together with the payload write, and
//! only then enqueues the task id. A rejected submission mutates nothing.

use std::io::ErrorKind;

use seistomo_core::{AcquisitionRequest, Task, TaskId, TomographyParameters};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::state::AppState;

/// Create a task in `Plain/None`.
pub async fn create_task(state: &AppState) -> Result<Task, PipelineError> {
    let task = Task::new();
    state.store.create_task(&task).await?;
    info!(task_id = %task.id, "Task created");
    Ok(task)
}

pub async fn get_task(state: &AppState, task_id: &TaskId) -> Result<Task, PipelineError> {
    state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(task_id.clone()))
}

/// Store the acquisition request and hand the task to the acquisition worker.
pub async fn submit_acquisition(
    state: &AppState,
    task_id: &TaskId,
    request: AcquisitionRequest,
) -> Result<Task, PipelineError> {
    request.validate()?;

    let task = state.store.submit_acquisition(task_id, &request).await?;
    state.acquisition_queue.enqueue(task_id.clone());

    info!(
        task_id = %task_id,
        network = %request.network,
        start_time = %request.start_time,
        end_time = %request.end_time,
        "Acquisition submitted"
    );
    Ok(task)
}

/// Store tomography parameters and hand the task to the tomography worker.
pub async fn submit_tomography(
    state: &AppState,
    task_id: &TaskId,
    parameters: TomographyParameters,
) -> Result<Task, PipelineError> {
    parameters.validate()?;

    let task = state.store.submit_tomography(task_id, &parameters).await?;
    state.tomography_queue.enqueue(task_id.clone());

    info!(
        task_id = %task_id,
        grid_size = ?parameters.grid_size,
        iter_max = parameters.iter_max,
        "Tomography submitted"
    );
    Ok(task)
}

/// Delete a task, everything it owns, and its artifact directory.
pub async fn delete_task(state: &AppState, task_id: &TaskId) -> Result<(), PipelineError> {
    if !state.store.delete_task(task_id).await? {
        return Err(PipelineError::NotFound(task_id.clone()));
    }

    let dir = state.config.task_dir(task_id.as_str());
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            warn!(task_id = %task_id, dir = %dir.display(), error = %e, "Failed to remove artifact directory");
        }
    }

    info!(task_id = %task_id, "Task deleted");
    Ok(())
}

#[cfg(all(test, feature = "hdf5"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use seistomo_core::{TaskState, TaskStep};

    use crate::config::Config;
    use crate::store::SqliteTaskStore;

    async fn state() -> AppState {
        let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
        AppState::new(Config::default(), store).unwrap()
    }

    fn request() -> AcquisitionRequest {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        AcquisitionRequest::new(start, start + Duration::days(1), "XX")
    }

    #[tokio::test]
    async fn test_submit_acquisition_enqueues_once() {
        let state = state().await;
        let task = create_task(&state).await.unwrap();

        let updated = submit_acquisition(&state, &task.id, request()).await.unwrap();
        assert_eq!(updated.state, TaskState::InProgress);
        assert_eq!(state.acquisition_queue.len(), 1);

        let err = submit_acquisition(&state, &task.id, request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionFailed(_)));
        assert_eq!(state.acquisition_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_mutates_nothing() {
        let state = state().await;
        let task = create_task(&state).await.unwrap();

        let mut bad = request();
        bad.network.clear();
        let err = submit_acquisition(&state, &task.id, bad).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let stored = get_task(&state, &task.id).await.unwrap();
        assert_eq!((stored.state, stored.step), (TaskState::Plain, TaskStep::None));
        assert!(state.acquisition_queue.is_empty());
    }

    #[tokio::test]
    async fn test_submit_to_missing_task() {
        let state = state().await;
        let err = submit_acquisition(&state, &TaskId::new("missing"), request())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_artifact_dir() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
        let config = Config {
            artifact_root: root.path().to_path_buf(),
            ..Default::default()
        };
        let state = AppState::new(config, store).unwrap();

        let task = create_task(&state).await.unwrap();
        let dir = state.config.task_dir(task.id.as_str());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("input.h5"), b"x").unwrap();

        delete_task(&state, &task.id).await.unwrap();
        assert!(!dir.exists());
        assert!(matches!(
            get_task(&state, &task.id).await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            delete_task(&state, &task.id).await,
            Err(PipelineError::NotFound(_))
        ));
    }
}
