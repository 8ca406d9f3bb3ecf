//! Repository for the `jobs` table.
//!
//! Every write other than the initial insert is guarded by the current
//! status, so terminal rows are never modified and progress cannot land on
//! a finished job.

use sieve_core::stage::Stage;
use sieve_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::JobRow;
use crate::models::status::{DbJobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, image_path, status_id, step, attempt, \
    result, error_message, error_attempt, \
    created_at, updated_at, completed_at";

/// Statuses from which a worker may still write.
const IN_FLIGHT_STATUSES: [StatusId; 2] = [
    DbJobStatus::Running as StatusId,
    DbJobStatus::Progress as StatusId,
];

/// Terminal statuses: succeeded, failed.
const TERMINAL_STATUSES: [StatusId; 2] = [
    DbJobStatus::Succeeded as StatusId,
    DbJobStatus::Failed as StatusId,
];

pub struct JobRepo;

impl JobRepo {
    /// Insert a fresh pending job.
    pub async fn insert_pending(
        pool: &PgPool,
        id: JobId,
        image_path: &str,
    ) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, image_path, status_id, attempt) \
             VALUES ($1, $2, $3, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(image_path)
            .bind(DbJobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Delete a job that no worker has picked up yet.
    ///
    /// Returns `true` if a pending row was removed.
    pub async fn delete_pending(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND status_id = $2")
            .bind(id)
            .bind(DbJobStatus::Pending.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Begin a new attempt: `RUNNING`, `attempt + 1`, step cleared.
    ///
    /// Returns `None` if the job is missing or terminal.
    pub async fn start_attempt(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, attempt = attempt + 1, step = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(DbJobStatus::Running.id())
            .bind(TERMINAL_STATUSES[0])
            .bind(TERMINAL_STATUSES[1])
            .fetch_optional(pool)
            .await
    }

    /// Record that `stage` is about to run.
    pub async fn update_progress(
        pool: &PgPool,
        id: JobId,
        stage: Stage,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, step = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(DbJobStatus::Progress.id())
        .bind(stage.label())
        .bind(IN_FLIGHT_STATUSES[0])
        .bind(IN_FLIGHT_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job as succeeded with its result payload. Single statement, so
    /// the payload is either fully written or absent.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, result = $3, step = NULL, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(DbJobStatus::Succeeded.id())
        .bind(result)
        .bind(IN_FLIGHT_STATUSES[0])
        .bind(IN_FLIGHT_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job as failed, capturing the attempt count at failure time.
    pub async fn fail(pool: &PgPool, id: JobId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, error_attempt = attempt, step = NULL, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(DbJobStatus::Failed.id())
        .bind(error)
        .bind(IN_FLIGHT_STATUSES[0])
        .bind(IN_FLIGHT_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
