//! Tomography stage support for seistomo.
//!
//! This crate turns a task's observations and tomography parameters into the
//! solver's input container and runs the external solver as a subprocess.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use seistomo_solver::SolverInvoker;
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let invoker = SolverInvoker::new("/opt/st3d/bin/st3d")
//!         .with_timeout(Duration::from_secs(3600));
//!
//!     let run = invoker
//!         .run(Path::new("input.h5"), Path::new("output.h5"))
//!         .await?;
//!
//!     println!("Solver finished in {} ms", run.duration_ms);
//!     Ok(())
//! }
//! ```

pub mod container;
mod error;
pub mod geo;
pub mod grid;
pub mod input;
mod invoker;

pub use container::{hdf5_writer, Container, ContainerWriter, Group, NdArray, Values};
#[cfg(feature = "hdf5")]
pub use container::Hdf5Writer;
pub use error::{ContainerError, GridError, SolverError};
pub use geo::{LocalFrame, EARTH_RADIUS_KM};
pub use grid::ReliefRaster;
pub use input::{build_solver_input, DepthLimits, GridBounds};
pub use invoker::{SolverInvoker, SolverRun};
