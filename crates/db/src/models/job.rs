//! Row model for the `jobs` table (the result store).

use sieve_core::analysis::AnalysisResult;
use sieve_core::job::{JobFailure, JobRecord, JobState};
use sieve_core::stage::Stage;
use sieve_core::store::StoreError;
use sieve_core::types::{JobId, Timestamp};
use sqlx::FromRow;

use super::status::{DbJobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub image_path: String,
    pub status_id: StatusId,
    pub step: Option<String>,
    pub attempt: i32,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_attempt: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: row.id, reason };

        let status = DbJobStatus::from_id(row.status_id)
            .ok_or_else(|| corrupt(format!("unknown status_id {}", row.status_id)))?;

        let state = match status {
            DbJobStatus::Pending => JobState::Pending,
            DbJobStatus::Running => JobState::Running,
            DbJobStatus::Progress => {
                let label = row
                    .step
                    .as_deref()
                    .ok_or_else(|| corrupt("progress row without step".into()))?;
                let step = Stage::from_label(label)
                    .ok_or_else(|| corrupt(format!("unknown step '{label}'")))?;
                JobState::Progress { step }
            }
            DbJobStatus::Succeeded => {
                let value = row
                    .result
                    .clone()
                    .ok_or_else(|| corrupt("succeeded row without result".into()))?;
                let payload: AnalysisResult = serde_json::from_value(value)
                    .map_err(|e| corrupt(format!("undecodable result: {e}")))?;
                JobState::Succeeded { payload }
            }
            DbJobStatus::Failed => JobState::Failed {
                error: JobFailure {
                    message: row.error_message.clone().unwrap_or_default(),
                    attempt: row.error_attempt.unwrap_or(row.attempt).max(0) as u32,
                },
            },
        };

        Ok(JobRecord {
            id: row.id,
            image_path: row.image_path,
            state,
            attempt: row.attempt.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}
