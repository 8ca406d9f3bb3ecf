//! PostgreSQL implementations of the core storage traits.

use std::time::Duration;

use async_trait::async_trait;
use sieve_core::analysis::AnalysisResult;
use sieve_core::job::{JobMessage, JobRecord};
use sieve_core::stage::Stage;
use sieve_core::store::{Delivery, JobQueue, ResultStore, StoreError, WorkerRegistry};
use sieve_core::types::JobId;

use crate::repositories::{JobRepo, QueueRepo, WorkerRepo};
use crate::DbPool;

/// PostgreSQL unique violation.
const UNIQUE_VIOLATION: &str = "23505";

fn unavailable(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Database operation failed");
    StoreError::Unavailable(err.to_string())
}

// ---------------------------------------------------------------------------
// Result store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgResultStore {
    pool: DbPool,
}

impl PgResultStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn insert_pending(&self, record: &JobRecord) -> Result<(), StoreError> {
        match JobRepo::insert_pending(&self.pool, record.id, &record.image_path).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Duplicate(record.id))
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn discard_pending(&self, id: JobId) -> Result<bool, StoreError> {
        JobRepo::delete_pending(&self.pool, id)
            .await
            .map_err(unavailable)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(unavailable)?
            .map(JobRecord::try_from)
            .transpose()
    }

    async fn start_attempt(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        JobRepo::start_attempt(&self.pool, id)
            .await
            .map_err(unavailable)?
            .map(JobRecord::try_from)
            .transpose()
    }

    async fn record_progress(&self, id: JobId, stage: Stage) -> Result<bool, StoreError> {
        JobRepo::update_progress(&self.pool, id, stage)
            .await
            .map_err(unavailable)
    }

    async fn complete(&self, id: JobId, payload: &AnalysisResult) -> Result<bool, StoreError> {
        let value = serde_json::to_value(payload).map_err(|e| StoreError::Corrupt {
            id,
            reason: format!("unserializable payload: {e}"),
        })?;
        JobRepo::complete(&self.pool, id, &value)
            .await
            .map_err(unavailable)
    }

    async fn fail(&self, id: JobId, message: &str) -> Result<bool, StoreError> {
        JobRepo::fail(&self.pool, id, message)
            .await
            .map_err(unavailable)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(unavailable)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgJobQueue {
    pool: DbPool,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, message: &JobMessage) -> Result<(), StoreError> {
        let tag = QueueRepo::enqueue(&self.pool, message.job_id, &message.image_path)
            .await
            .map_err(unavailable)?;
        tracing::debug!(job_id = %message.job_id, tag, "Message enqueued");
        Ok(())
    }

    async fn claim(
        &self,
        consumer: &str,
        lease: Duration,
    ) -> Result<Option<Delivery>, StoreError> {
        let row = QueueRepo::claim_next(&self.pool, consumer, lease)
            .await
            .map_err(unavailable)?;
        Ok(row.map(Delivery::from))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let removed = QueueRepo::ack(&self.pool, delivery.tag, delivery.lease_token)
            .await
            .map_err(unavailable)?;
        if !removed {
            tracing::warn!(
                tag = delivery.tag,
                job_id = %delivery.message.job_id,
                "Ack ignored: lease no longer held",
            );
        }
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), StoreError> {
        let released = QueueRepo::release(&self.pool, delivery.tag, delivery.lease_token, delay)
            .await
            .map_err(unavailable)?;
        if !released {
            tracing::warn!(
                tag = delivery.tag,
                job_id = %delivery.message.job_id,
                "Release ignored: lease no longer held",
            );
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        QueueRepo::depth(&self.pool)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}

// ---------------------------------------------------------------------------
// Worker registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgWorkerRegistry {
    pool: DbPool,
}

impl PgWorkerRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn heartbeat(&self, worker: &str) -> Result<(), StoreError> {
        WorkerRepo::heartbeat(&self.pool, worker)
            .await
            .map_err(unavailable)
    }

    async fn live_workers(&self, within: Duration) -> Result<Vec<String>, StoreError> {
        WorkerRepo::list_live(&self.pool, within)
            .await
            .map_err(unavailable)
    }
}
