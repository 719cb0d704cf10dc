//! Seistomo Control Plane Library
//!
//! Task storage, the two stage queues and their worker loops, and the HTTP
//! submission API for the acquisition + tomography pipeline.

pub mod config;
pub mod error;
pub mod http;
pub mod queue;
pub mod service;
pub mod state;
pub mod store;
pub mod workers;

pub use config::{Args, Config};
pub use error::PipelineError;
pub use queue::WorkQueue;
pub use state::AppState;
pub use store::{SqliteTaskStore, StoreError, TaskStore};
