//! Stage worker loops.
//!
//! One long-running loop per stage drains that stage's [`WorkQueue`]. A loop
//! processes one task at a time and stops taking new items once the shared
//! shutdown token is cancelled.
//!
//! [`WorkQueue`]: crate::queue::WorkQueue

use std::sync::Arc;

use seistomo_core::{FailureReason, Stage, Task, TaskId, TaskStep};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::state::AppState;
use crate::store::StoreError;

pub mod acquisition;
pub mod tomography;

/// Spawn both stage loops.
pub fn spawn(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    [Stage::Acquisition, Stage::Tomography]
        .into_iter()
        .map(|stage| tokio::spawn(run_loop(state.clone(), stage)))
        .collect()
}

/// Re-enqueue tasks left `InProgress` by a previous run. Returns how many
/// were recovered.
pub async fn recover_in_flight(state: &AppState) -> Result<usize, StoreError> {
    let tasks = state.store.in_flight_tasks().await?;
    for task in &tasks {
        let stage = match task.step {
            TaskStep::None => Stage::Acquisition,
            TaskStep::DataAcquisition => Stage::Tomography,
            TaskStep::Tomography => {
                warn!(task_id = %task.id, "In-progress task already past tomography, skipping");
                continue;
            }
        };
        info!(task_id = %task.id, stage = %stage, "Re-enqueueing interrupted task");
        state.queue(stage).enqueue(task.id.clone());
    }
    Ok(tasks.len())
}

async fn run_loop(state: Arc<AppState>, stage: Stage) {
    info!(stage = %stage, "Worker loop started");
    let queue = state.queue(stage);

    loop {
        let task_id = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(task_id) => task_id,
                None => break,
            },
        };

        match stage {
            Stage::Acquisition => acquisition::process(&state, &task_id).await,
            Stage::Tomography => tomography::process(&state, &task_id).await,
        }
    }

    info!(stage = %stage, "Worker loop stopped");
}

/// Load the task and check it is in `stage`'s in-flight pair. Anything else
/// is logged and the item dropped.
async fn claim(state: &AppState, task_id: &TaskId, stage: Stage) -> Option<Task> {
    let task = match state.store.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id = %task_id, stage = %stage, "Dequeued unknown task, dropping");
            return None;
        }
        Err(e) => {
            error!(task_id = %task_id, stage = %stage, error = %e, "Failed to load dequeued task");
            return None;
        }
    };

    let (state_expected, step_expected) = stage.in_flight();
    if task.state != state_expected || task.step != step_expected {
        warn!(
            task_id = %task_id,
            stage = %stage,
            state = %task.state,
            step = %task.step,
            "Dequeued task is not in flight for this stage, dropping"
        );
        return None;
    }
    Some(task)
}

/// Move the task to `Failed` and record why.
async fn fail(state: &AppState, task_id: &TaskId, stage: Stage, err: &PipelineError) {
    let reason = FailureReason::new(err.failure_kind(), stage, err.to_string());
    error!(
        task_id = %task_id,
        stage = %stage,
        kind = %reason.kind,
        error = %err,
        "Stage failed"
    );

    if let Err(e) = state
        .store
        .transition(task_id, stage.failure(), Some(&reason))
        .await
    {
        error!(task_id = %task_id, stage = %stage, error = %e, "Failed to record stage failure");
    }
}
