//! Accepts uploads, creates job records, enqueues work, and answers polls.
//!
//! Submission order is: persist the file, insert a `PENDING` record, enqueue.
//! If a later step fails the earlier ones are rolled back, so a client never
//! receives an id for a job that no worker will pick up.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sieve_core::error::CoreError;
use sieve_core::job::{JobMessage, JobRecord};
use sieve_core::store::{JobQueue, ResultStore, StoreError};
use sieve_core::types::JobId;
use sieve_core::upload::{upload_path, validate_image_filename};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Bad filename or empty body. Nothing was persisted.
    #[error("{0}")]
    Validation(String),

    /// Upload or record could not be written. Nothing was enqueued.
    #[error("Failed to store upload: {0}")]
    Storage(String),

    /// The queue rejected the message. The record and file were removed.
    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SubmissionService<'a> {
    store: &'a dyn ResultStore,
    queue: &'a dyn JobQueue,
    upload_dir: &'a Path,
}

impl<'a> SubmissionService<'a> {
    pub fn new(store: &'a dyn ResultStore, queue: &'a dyn JobQueue, upload_dir: &'a Path) -> Self {
        Self {
            store,
            queue,
            upload_dir,
        }
    }

    /// Persist an upload and hand it to the worker pool. Returns as soon as
    /// the message is enqueued.
    pub async fn submit(&self, filename: &str, bytes: &[u8]) -> Result<JobId, SubmissionError> {
        let ext = validate_image_filename(filename).map_err(|e| match e {
            CoreError::Validation(msg) => SubmissionError::Validation(msg),
            other => SubmissionError::Validation(other.to_string()),
        })?;
        if bytes.is_empty() {
            return Err(SubmissionError::Validation("Uploaded file is empty.".into()));
        }

        let job_id = Uuid::new_v4();
        let image_path = self.persist(job_id, &ext, bytes).await?;
        let image_path_str = image_path.to_string_lossy().into_owned();

        let record = JobRecord::new_pending(job_id, image_path_str.clone(), Utc::now());
        if let Err(e) = self.store.insert_pending(&record).await {
            remove_upload(&image_path).await;
            return Err(SubmissionError::Storage(e.to_string()));
        }

        let message = JobMessage {
            job_id,
            image_path: image_path_str,
        };
        if let Err(e) = self.queue.enqueue(&message).await {
            tracing::error!(%job_id, error = %e, "Enqueue failed, rolling back submission");
            if let Err(discard_err) = self.store.discard_pending(job_id).await {
                tracing::error!(%job_id, error = %discard_err, "Failed to discard pending record");
            }
            remove_upload(&image_path).await;
            return Err(SubmissionError::QueueUnavailable(e.to_string()));
        }

        tracing::info!(
            %job_id,
            filename,
            size_bytes = bytes.len(),
            image_path = %message.image_path,
            "Job submitted",
        );
        Ok(job_id)
    }

    /// Current snapshot of a job. Pure read.
    pub async fn poll(&self, job_id: JobId) -> Result<JobRecord, SubmissionError> {
        self.store
            .get(job_id)
            .await?
            .ok_or(SubmissionError::NotFound(job_id))
    }

    /// Write the bytes to `<upload_dir>/<job_id>.<ext>` and return the
    /// absolute path workers will read.
    async fn persist(&self, job_id: JobId, ext: &str, bytes: &[u8]) -> Result<PathBuf, SubmissionError> {
        let storage = |e: std::io::Error| SubmissionError::Storage(e.to_string());

        tokio::fs::create_dir_all(self.upload_dir).await.map_err(storage)?;
        let path = upload_path(self.upload_dir, job_id, ext);
        tokio::fs::write(&path, bytes).await.map_err(storage)?;

        Ok(tokio::fs::canonicalize(&path).await.unwrap_or(path))
    }
}

async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sieve_core::job::JobStatus;
    use sieve_core::memory::{InMemoryJobQueue, InMemoryResultStore};

    #[tokio::test]
    async fn submit_persists_file_record_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryResultStore::new();
        let queue = InMemoryJobQueue::new();
        let svc = SubmissionService::new(&store, &queue, dir.path());

        let id = svc.submit("cat.PNG", b"fake-bytes").await.unwrap();

        let rec = svc.poll(id).await.unwrap();
        assert_eq!(rec.status(), JobStatus::Pending);
        assert_eq!(rec.attempt, 0);
        assert!(rec.image_path.ends_with(&format!("{id}.png")));
        assert_eq!(std::fs::read(&rec.image_path).unwrap(), b"fake-bytes");
        assert_eq!(queue.depth().await, 1);
    }

    #[tokio::test]
    async fn invalid_upload_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryResultStore::new();
        let queue = InMemoryJobQueue::new();
        let svc = SubmissionService::new(&store, &queue, dir.path());

        assert_matches!(
            svc.submit("anim.gif", b"GIF89a").await,
            Err(SubmissionError::Validation(_))
        );
        assert_matches!(
            svc.submit("empty.jpg", b"").await,
            Err(SubmissionError::Validation(_))
        );
        assert!(store.is_empty().await);
        assert_eq!(queue.depth().await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryResultStore::new();
        let queue = InMemoryJobQueue::new();
        let svc = SubmissionService::new(&store, &queue, dir.path());

        let id = Uuid::new_v4();
        assert_matches!(svc.poll(id).await, Err(SubmissionError::NotFound(got)) if got == id);
    }
}
