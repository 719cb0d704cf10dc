//! HTTP request handlers.

mod artifacts;
mod health;
mod observations;
mod submission;
mod tasks;

pub use artifacts::{get_artifact, stream_export, stream_output};
pub use health::health_check;
pub use observations::{list_detections, list_events, list_stations};
pub use submission::{
    get_acquisition, get_tomography, submit_acquisition, submit_tomography,
};
pub use tasks::{count_tasks, create_task, delete_task, get_task, list_tasks};
