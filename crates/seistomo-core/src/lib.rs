//! Seistomo Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! It owns the task state machine and the records that flow between the
//! acquisition and tomography stages.

pub mod acquisition;
pub mod error;
pub mod ids;
pub mod observation;
pub mod state;
pub mod task;
pub mod tomography;

// Re-export commonly used types
pub use acquisition::{AcquisitionRequest, BoundingBox};
pub use error::CoreError;
pub use ids::TaskId;
pub use observation::{
    Detection, Event, EventObservations, EventRecord, ObservationBatch, ObservationSet, Phase,
    PickRecord, Station, StationRecord,
};
pub use state::{Stage, TaskState, TaskStep, Transition};
pub use task::{FailureKind, FailureReason, Task};
pub use tomography::{
    SolverArtifact, TomographyParameters, MAX_BASE_MODEL_ROWS, MAX_GRID_AXIS, MAX_GRID_NODES,
    MAX_ITER, MAX_LSQR_ITER,
};
