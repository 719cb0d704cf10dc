//! Tomography stage: build the solver input, run the solver, and record the
//! artifacts with the stage transition.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use seistomo_core::{SolverArtifact, Stage, Task, TaskId};
use seistomo_solver::{build_solver_input, ReliefRaster};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::state::AppState;

pub const INPUT_FILE: &str = "input.h5";
pub const OUTPUT_FILE: &str = "output.h5";
/// Visualization export the solver may leave next to its output.
pub const EXPORT_FILE: &str = "model.vtk";

pub async fn process(state: &AppState, task_id: &TaskId) {
    if super::claim(state, task_id, Stage::Tomography).await.is_none() {
        return;
    }
    let started = Instant::now();
    info!(task_id = %task_id, "Tomography started");

    match run(state, task_id).await {
        Ok(task) => info!(
            task_id = %task_id,
            state = %task.state,
            step = %task.step,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tomography completed"
        ),
        Err(e) => super::fail(state, task_id, Stage::Tomography, &e).await,
    }
}

async fn run(state: &AppState, task_id: &TaskId) -> Result<Task, PipelineError> {
    let parameters = state
        .store
        .get_tomography_parameters(task_id)
        .await?
        .ok_or_else(|| PipelineError::MissingInput("no tomography parameters stored".to_string()))?;
    let observations = state.store.get_observations(task_id).await?;

    let dir = state.config.task_dir(task_id.as_str());
    tokio::fs::create_dir_all(&dir).await?;
    // The solver runs inside this directory; hand it absolute paths.
    let dir = tokio::fs::canonicalize(&dir).await?;
    let input_path = dir.join(INPUT_FILE);
    let output_path = dir.join(OUTPUT_FILE);
    let export_path = dir.join(EXPORT_FILE);

    let relief_path = state.config.relief_path.clone();
    let depth = state.depth_limits();
    let writer = state.writer.clone();
    let input = input_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
        let relief = ReliefRaster::load(&relief_path)?;
        let container = build_solver_input(&parameters, &observations, &relief, depth)?;
        writer.write(&container, &input)?;
        Ok(())
    })
    .await??;
    debug!(task_id = %task_id, path = %input_path.display(), "Solver input written");

    let run = state.invoker.run(&input_path, &output_path).await?;
    debug!(task_id = %task_id, duration_ms = run.duration_ms, "Solver finished");

    if !exists(&output_path).await {
        return Err(PipelineError::MissingOutput(output_path));
    }
    let export_path = exists(&export_path).await.then_some(export_path);

    let artifact = SolverArtifact {
        input_path,
        output_path,
        export_path,
        created_at: Utc::now(),
    };
    Ok(state.store.complete_tomography(task_id, &artifact).await?)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

