//! Error types for solver input preparation and execution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or resampling grids.
#[derive(Debug, Error)]
pub enum GridError {
    /// Relief file could not be read.
    #[error("failed to read relief file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relief line is not three numbers.
    #[error("relief line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// Relief points do not form a complete regular grid.
    #[error("relief is not a regular grid: {0}")]
    Irregular(String),

    /// Requested shape is unusable.
    #[error("invalid grid shape: {0}")]
    Shape(String),
}

/// Errors raised while writing the solver input container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("I/O error writing container: {0}")]
    Io(#[from] std::io::Error),

    /// No writer for the required format was compiled in.
    #[error("container format unavailable: {0}")]
    Unsupported(&'static str),

    /// Array shapes are inconsistent with the schema.
    #[error("container schema violation: {0}")]
    Schema(String),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

/// Errors that can occur when running the external solver.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver executable could not be started.
    #[error("failed to spawn solver '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The solver exited unsuccessfully.
    #[error("solver exited with {}: {stderr_tail}", exit_label(.code))]
    Exit {
        code: Option<i32>,
        stderr_tail: String,
    },

    /// The solver ran longer than allowed and was killed.
    #[error("solver timed out after {secs}s and was killed")]
    Timeout { secs: u64 },

    /// Waiting on the solver process failed.
    #[error("I/O error while waiting for solver: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}
