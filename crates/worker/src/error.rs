use sieve_core::error::CoreError;
use sieve_core::store::StoreError;

/// Errors that stop a worker cycle. Analysis failures never surface here;
/// they are settled against the job record instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<CoreError> for WorkerError {
    fn from(err: CoreError) -> Self {
        Self::Config(err.to_string())
    }
}
