//! Row model for the `job_queue` table.

use sieve_core::job::JobMessage;
use sieve_core::store::Delivery;
use sieve_core::types::JobId;
use sqlx::FromRow;
use uuid::Uuid;

/// A claimed `job_queue` row, as returned by the claim query.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedRow {
    pub id: i64,
    pub job_id: JobId,
    pub image_path: String,
    pub lease_token: Uuid,
    pub delivery_count: i32,
}

impl From<ClaimedRow> for Delivery {
    fn from(row: ClaimedRow) -> Self {
        Delivery {
            tag: row.id,
            lease_token: row.lease_token,
            message: JobMessage {
                job_id: row.job_id,
                image_path: row.image_path,
            },
            delivery_count: row.delivery_count.max(0) as u32,
        }
    }
}
