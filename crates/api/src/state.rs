use std::sync::Arc;

use sieve_core::store::{JobQueue, ResultStore, WorkerRegistry};

use crate::config::ServerConfig;
use crate::submission::SubmissionService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job records, written by workers and read here.
    pub store: Arc<dyn ResultStore>,
    /// Durable queue feeding the worker pool.
    pub queue: Arc<dyn JobQueue>,
    /// Worker heartbeats, for `/health`.
    pub workers: Arc<dyn WorkerRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn submissions(&self) -> SubmissionService<'_> {
        SubmissionService::new(
            self.store.as_ref(),
            self.queue.as_ref(),
            &self.config.upload_dir,
        )
    }
}
