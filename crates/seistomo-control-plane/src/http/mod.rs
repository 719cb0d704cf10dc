//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task lifecycle (`/v1/tasks`, `/v1/tasks/:id`)
//! - Stage submission (`/v1/tasks/:id/acquisition`, `/v1/tasks/:id/tomography`)
//! - Observations (`/v1/tasks/:id/stations`, `/events`, `/detections`)
//! - Solver artifacts (`/v1/tasks/:id/artifacts`, `/output`, `/export`)
//! - Health check (`/health`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Task lifecycle
        .route("/v1/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route("/v1/tasks/count", get(handlers::count_tasks))
        .route(
            "/v1/tasks/:id",
            get(handlers::get_task).delete(handlers::delete_task),
        )
        // Stage submission
        .route(
            "/v1/tasks/:id/acquisition",
            post(handlers::submit_acquisition).get(handlers::get_acquisition),
        )
        .route(
            "/v1/tasks/:id/tomography",
            post(handlers::submit_tomography).get(handlers::get_tomography),
        )
        // Observations
        .route("/v1/tasks/:id/stations", get(handlers::list_stations))
        .route("/v1/tasks/:id/events", get(handlers::list_events))
        .route("/v1/tasks/:id/detections", get(handlers::list_detections))
        // Artifacts
        .route("/v1/tasks/:id/artifacts", get(handlers::get_artifact))
        .route("/v1/tasks/:id/artifacts/output", get(handlers::stream_output))
        .route("/v1/tasks/:id/artifacts/export", get(handlers::stream_export))
        // Observability
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
