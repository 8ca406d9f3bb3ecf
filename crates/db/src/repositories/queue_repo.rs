//! Repository for the `job_queue` table.
//!
//! Claims use `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
//! receive the same row, and a lease so a crashed worker's message comes
//! back once the lease runs out.

use std::time::Duration;

use sieve_core::types::JobId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::queue::ClaimedRow;

pub struct QueueRepo;

impl QueueRepo {
    pub async fn enqueue(pool: &PgPool, job_id: JobId, image_path: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO job_queue (job_id, image_path) VALUES ($1, $2) RETURNING id",
        )
        .bind(job_id)
        .bind(image_path)
        .fetch_one(pool)
        .await
    }

    /// Atomically claim the oldest visible, unleased message.
    pub async fn claim_next(
        pool: &PgPool,
        consumer: &str,
        lease: Duration,
    ) -> Result<Option<ClaimedRow>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedRow>(
            "UPDATE job_queue \
             SET leased_by = $1, lease_token = $2, \
                 leased_until = NOW() + make_interval(secs => $3), \
                 delivery_count = delivery_count + 1 \
             WHERE id = ( \
                 SELECT id FROM job_queue \
                 WHERE visible_at <= NOW() \
                   AND (leased_until IS NULL OR leased_until <= NOW()) \
                 ORDER BY visible_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, job_id, image_path, lease_token, delivery_count",
        )
        .bind(consumer)
        .bind(Uuid::new_v4())
        .bind(lease.as_secs_f64())
        .fetch_optional(pool)
        .await
    }

    /// Delete a message held under `lease_token`. A stale token is a no-op.
    pub async fn ack(pool: &PgPool, id: i64, lease_token: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM job_queue WHERE id = $1 AND lease_token = $2")
            .bind(id)
            .bind(lease_token)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the lease and make the message visible again after `delay`.
    pub async fn release(
        pool: &PgPool,
        id: i64,
        lease_token: Uuid,
        delay: Duration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_queue \
             SET leased_by = NULL, lease_token = NULL, leased_until = NULL, \
                 visible_at = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND lease_token = $2",
        )
        .bind(id)
        .bind(lease_token)
        .bind(delay.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of unacknowledged messages.
    pub async fn depth(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_queue")
            .fetch_one(pool)
            .await
    }
}
