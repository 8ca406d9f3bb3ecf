//! Storage seams shared by the submission service and the worker pool.
//!
//! - [`ResultStore`]: job id -> [`JobRecord`]. Workers write, pollers read.
//! - [`JobQueue`]: at-least-once delivery with leases, ack and delayed release.
//! - [`WorkerRegistry`]: worker heartbeats for liveness reporting.
//!
//! Write methods that touch an existing record return `false` when the
//! write was not applied because the record is missing or already terminal.

use std::time::Duration;

use async_trait::async_trait;

use crate::analysis::AnalysisResult;
use crate::job::{JobMessage, JobRecord};
use crate::stage::Stage;
use crate::types::JobId;

/// Backend failures, independent of the concrete store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Job {0} already exists")]
    Duplicate(JobId),

    #[error("Corrupt record for job {id}: {reason}")]
    Corrupt { id: JobId, reason: String },
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a fresh `PENDING` record. Fails with [`StoreError::Duplicate`]
    /// if the id is already taken.
    async fn insert_pending(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Remove a record that is still `PENDING`. Used only to roll back a
    /// submission whose enqueue failed.
    async fn discard_pending(&self, id: JobId) -> Result<bool, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Move to `RUNNING` and increment `attempt`. Returns the updated record,
    /// or `None` if the record is missing or terminal.
    async fn start_attempt(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    async fn record_progress(&self, id: JobId, stage: Stage) -> Result<bool, StoreError>;

    async fn complete(&self, id: JobId, payload: &AnalysisResult) -> Result<bool, StoreError>;

    async fn fail(&self, id: JobId, message: &str) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// A claimed message. Invisible to other consumers until acked, released,
/// or its lease expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: i64,
    /// Identifies this particular claim; ack/release from a stale claim is a
    /// no-op.
    pub lease_token: uuid::Uuid,
    pub message: JobMessage,
    /// Number of times this message has been handed out, including this one.
    pub delivery_count: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, message: &JobMessage) -> Result<(), StoreError>;

    /// Claim the oldest visible message for `consumer`, hiding it for `lease`.
    async fn claim(&self, consumer: &str, lease: Duration)
        -> Result<Option<Delivery>, StoreError>;

    /// Remove the message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Return the message to the queue, visible again after `delay`.
    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn heartbeat(&self, worker: &str) -> Result<(), StoreError>;

    /// Workers seen within `within`, most recent first.
    async fn live_workers(&self, within: Duration) -> Result<Vec<String>, StoreError>;
}
