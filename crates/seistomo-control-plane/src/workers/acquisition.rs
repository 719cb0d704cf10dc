//! Acquisition stage: fetch the bulletin and inventory, parse them into
//! observations, and commit the batch with the stage transition.

use std::time::Instant;

use seistomo_core::{AcquisitionRequest, Stage, Task, TaskId};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::state::AppState;

pub async fn process(state: &AppState, task_id: &TaskId) {
    if super::claim(state, task_id, Stage::Acquisition).await.is_none() {
        return;
    }
    let started = Instant::now();
    info!(task_id = %task_id, "Acquisition started");

    match run(state, task_id).await {
        Ok(task) => info!(
            task_id = %task_id,
            state = %task.state,
            step = %task.step,
            duration_ms = started.elapsed().as_millis() as u64,
            "Acquisition completed"
        ),
        Err(e) => super::fail(state, task_id, Stage::Acquisition, &e).await,
    }
}

async fn run(state: &AppState, task_id: &TaskId) -> Result<Task, PipelineError> {
    let request = load_request(state, task_id).await?;

    let payloads = state.fdsn.fetch_all(&request).await?;
    debug!(
        task_id = %task_id,
        bulletin_bytes = payloads.bulletin.len(),
        inventory_bytes = payloads.inventory.len(),
        "Fetched data service payloads"
    );

    let parser = state.parser.clone();
    let batch = tokio::task::spawn_blocking(move || {
        parser.parse(&payloads.bulletin, &payloads.inventory)
    })
    .await??;

    debug!(
        task_id = %task_id,
        stations = batch.stations.len(),
        events = batch.events.len(),
        detections = batch.detection_count(),
        "Parsed observations"
    );

    Ok(state.store.commit_observations(task_id, &batch).await?)
}

async fn load_request(
    state: &AppState,
    task_id: &TaskId,
) -> Result<AcquisitionRequest, PipelineError> {
    state
        .store
        .get_acquisition_request(task_id)
        .await?
        .ok_or_else(|| PipelineError::MissingInput("no acquisition request stored".to_string()))
}
