//! Repository for the `workers` heartbeat table.

use std::time::Duration;

use sqlx::PgPool;

pub struct WorkerRepo;

impl WorkerRepo {
    /// Insert or refresh a worker's `last_seen_at`.
    pub async fn heartbeat(pool: &PgPool, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO workers (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET last_seen_at = NOW()",
        )
        .bind(name)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Names of workers seen within `within`, most recent first.
    pub async fn list_live(pool: &PgPool, within: Duration) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM workers \
             WHERE last_seen_at >= NOW() - make_interval(secs => $1) \
             ORDER BY last_seen_at DESC",
        )
        .bind(within.as_secs_f64())
        .fetch_all(pool)
        .await
    }
}
