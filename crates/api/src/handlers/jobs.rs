//! Handlers for the `/jobs` resource.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sieve_core::analysis::AnalysisResult;
use sieve_core::job::{JobRecord, JobStatus};
use sieve_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Status reported to clients right after submission.
const SUBMITTED_STATUS: &str = "processing";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: &'static str,
}

/// Poll response. `result` is present only for `success`, `error` only for
/// `failed`, `step` only while a stage is running.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub status: &'static str,
    pub task_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<&'static str>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client-facing status name. `RUNNING` and `PROGRESS` both read as `running`.
pub fn wire_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running | JobStatus::Progress => "running",
        JobStatus::Succeeded => "success",
        JobStatus::Failed => "failed",
    }
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        let status = wire_status(record.status());
        let step = record.step().map(|s| s.label());
        let result = record.payload().cloned();
        let error = record.error().map(|e| e.message.clone());
        Self {
            status,
            task_id: record.id,
            step,
            attempt: record.attempt,
            result,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /jobs
///
/// Accepts a multipart form with one file field. The first field carrying a
/// filename is taken as the image; other fields are ignored.
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::from)?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if upload.is_some() {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(AppError::from)?;
        upload = Some((filename, data.to_vec()));
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("Missing file upload".into()))?;

    let job_id = state.submissions().submit(&filename, &data).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: SUBMITTED_STATUS,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// GET /jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid job id '{job_id}'")))?;

    let record = state.submissions().poll(job_id).await?;
    Ok(Json(record.into()))
}
