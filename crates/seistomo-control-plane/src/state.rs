//! Shared application state.

use std::sync::Arc;

use seistomo_core::Stage;
use seistomo_fdsn::{FdsnClient, FdsnXmlParser, ObservationParser, RetryPolicy};
use seistomo_solver::{hdf5_writer, ContainerWriter, DepthLimits, SolverInvoker};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::PipelineError;
use crate::queue::WorkQueue;
use crate::store::TaskStore;

/// Everything the HTTP handlers and the worker loops share. Built once at
/// startup and handed around as `Arc<AppState>`.
pub struct AppState {
    pub config: Config,

    /// Persistence for tasks and everything they own.
    pub store: Arc<dyn TaskStore>,

    pub acquisition_queue: WorkQueue,
    pub tomography_queue: WorkQueue,

    /// Data service client used by the acquisition worker.
    pub fdsn: FdsnClient,

    /// Bulletin/inventory decoder used by the acquisition worker.
    pub parser: Arc<dyn ObservationParser>,

    /// Solver input encoder used by the tomography worker.
    pub writer: Arc<dyn ContainerWriter>,

    pub invoker: SolverInvoker,

    /// Cancelled on shutdown; worker loops stop taking new items.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state from configuration with the default components.
    ///
    /// Fails when the data service URL is unusable or when no HDF5 writer
    /// was compiled in.
    pub fn new(config: Config, store: Arc<dyn TaskStore>) -> Result<Self, PipelineError> {
        let fdsn = FdsnClient::with_timeout(&config.fdsn_base, config.fetch_timeout)?
            .with_retry(RetryPolicy::with_attempts(config.fetch_attempts));
        let parser = Arc::new(FdsnXmlParser::new(config.reference_channel.clone()));
        let writer = hdf5_writer()?;
        let invoker = SolverInvoker::new(config.solver_path.clone())
            .with_timeout(config.solver_timeout);

        Ok(Self {
            config,
            store,
            acquisition_queue: WorkQueue::new(Stage::Acquisition),
            tomography_queue: WorkQueue::new(Stage::Tomography),
            fdsn,
            parser,
            writer,
            invoker,
            shutdown: CancellationToken::new(),
        })
    }

    /// Builder method to replace the data service client.
    pub fn with_fdsn(mut self, fdsn: FdsnClient) -> Self {
        self.fdsn = fdsn;
        self
    }

    /// Builder method to replace the observation parser.
    pub fn with_parser(mut self, parser: Arc<dyn ObservationParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Builder method to replace the container writer.
    pub fn with_writer(mut self, writer: Arc<dyn ContainerWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// The queue drained by `stage`'s worker loop.
    pub fn queue(&self, stage: Stage) -> &WorkQueue {
        match stage {
            Stage::Acquisition => &self.acquisition_queue,
            Stage::Tomography => &self.tomography_queue,
        }
    }

    pub fn depth_limits(&self) -> DepthLimits {
        DepthLimits {
            min_km: self.config.grid_depth_min_km,
            max_km: self.config.grid_depth_max_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteTaskStore;

    #[cfg(feature = "hdf5")]
    #[tokio::test]
    async fn test_default_writer_is_hdf5() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
        let state = AppState::new(Config::default(), store).unwrap();

        let path = dir.path().join("input.h5");
        state
            .writer
            .write(&seistomo_solver::Container::default(), &path)
            .unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[..8], b"\x89HDF\r\n\x1a\n");
    }

    #[cfg(not(feature = "hdf5"))]
    #[tokio::test]
    async fn test_refuses_to_start_without_hdf5() {
        let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
        let err = AppState::new(Config::default(), store).err().unwrap();
        assert!(matches!(err, PipelineError::Container(_)));
    }
}
