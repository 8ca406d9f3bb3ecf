//! Job record and lifecycle state machine.
//!
//! ```text
//! PENDING --dequeue--> RUNNING --stage start--> PROGRESS(step) --(loop)--> SUCCEEDED
//! RUNNING|PROGRESS --transient, attempts remain--> RUNNING (next attempt)
//! RUNNING|PROGRESS --permanent | exhausted--> FAILED
//! ```
//!
//! `SUCCEEDED` and `FAILED` are terminal and write-once. The payload and the
//! failure live inside the terminal variants, so a record can never carry
//! both.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::error::CoreError;
use crate::stage::Stage;
use crate::types::{JobId, Timestamp};

/// Fieldless view of [`JobState`], used for storage and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Progress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => next == Running,
            Running | Progress => matches!(next, Running | Progress | Succeeded | Failed),
            Succeeded | Failed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Progress => "progress",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// Terminal failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    /// Attempt count at the moment the job failed.
    pub attempt: u32,
}

/// Current lifecycle state of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Running,
    Progress { step: Stage },
    Succeeded { payload: AnalysisResult },
    Failed { error: JobFailure },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Running => JobStatus::Running,
            JobState::Progress { .. } => JobStatus::Progress,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Snapshot of one job as held by the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    /// Persisted upload path; the only handle passed to workers.
    pub image_path: String,
    pub state: JobState,
    /// Execution attempts made so far. Zero until the first dequeue.
    pub attempt: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// A freshly submitted job that no worker has touched yet.
    pub fn new_pending(id: JobId, image_path: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            image_path: image_path.into(),
            state: JobState::Pending,
            attempt: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn step(&self) -> Option<Stage> {
        match &self.state {
            JobState::Progress { step } => Some(*step),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&AnalysisResult> {
        match &self.state {
            JobState::Succeeded { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Begin a new execution attempt: `RUNNING`, `attempt + 1`.
    ///
    /// Returns the new attempt number.
    pub fn start_attempt(&mut self, now: Timestamp) -> Result<u32, CoreError> {
        self.transition(JobState::Running, now)?;
        self.attempt += 1;
        Ok(self.attempt)
    }

    /// Record that `stage` is about to run.
    pub fn enter_stage(&mut self, stage: Stage, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobState::Progress { step: stage }, now)
    }

    /// Write the success payload. Terminal.
    pub fn succeed(&mut self, payload: AnalysisResult, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobState::Succeeded { payload }, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Write the failure with the current attempt count. Terminal.
    pub fn fail(&mut self, message: impl Into<String>, now: Timestamp) -> Result<(), CoreError> {
        let error = JobFailure {
            message: message.into(),
            attempt: self.attempt,
        };
        self.transition(JobState::Failed { error }, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: JobState, now: Timestamp) -> Result<(), CoreError> {
        let from = self.status();
        let to = next.status();
        if !from.can_transition_to(to) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id,
                from.as_str(),
                to.as_str()
            )));
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Queue message carrying one job from the submission service to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub image_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ModelInfo;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn payload() -> AnalysisResult {
        AnalysisResult {
            image_path: "/tmp/a.png".into(),
            nsfw: false,
            nsfw_score: 0.01,
            faces_detected: 1,
            ocr_text: "hello".into(),
            blur_score: 140.2,
            quality_score: 1.0,
            processing_time: 0.4,
            model: ModelInfo {
                face: "f".into(),
                ocr: "o".into(),
                nsfw: "heuristic-v1".into(),
                device: "cpu".into(),
            },
        }
    }

    fn pending() -> JobRecord {
        JobRecord::new_pending(Uuid::new_v4(), "/tmp/a.png", Utc::now())
    }

    #[test]
    fn new_record_is_pending_with_zero_attempts() {
        let rec = pending();
        assert_eq!(rec.status(), JobStatus::Pending);
        assert_eq!(rec.attempt, 0);
        assert!(rec.payload().is_none());
        assert!(rec.error().is_none());
        assert!(rec.completed_at.is_none());
    }

    #[test]
    fn happy_path_walks_every_stage() {
        let mut rec = pending();
        assert_eq!(rec.start_attempt(Utc::now()).unwrap(), 1);
        for stage in Stage::ALL {
            rec.enter_stage(stage, Utc::now()).unwrap();
            assert_eq!(rec.step(), Some(stage));
        }
        rec.succeed(payload(), Utc::now()).unwrap();
        assert!(rec.is_terminal());
        assert_eq!(rec.payload(), Some(&payload()));
        assert!(rec.error().is_none());
        assert!(rec.step().is_none());
        assert!(rec.completed_at.is_some());
    }

    #[test]
    fn retry_returns_to_running_and_bumps_attempt() {
        let mut rec = pending();
        rec.start_attempt(Utc::now()).unwrap();
        rec.enter_stage(Stage::FaceDetection, Utc::now()).unwrap();
        assert_eq!(rec.start_attempt(Utc::now()).unwrap(), 2);
        assert_eq!(rec.status(), JobStatus::Running);
    }

    #[test]
    fn failure_captures_attempt() {
        let mut rec = pending();
        rec.start_attempt(Utc::now()).unwrap();
        rec.start_attempt(Utc::now()).unwrap();
        rec.fail("Invalid image", Utc::now()).unwrap();
        let err = rec.error().unwrap();
        assert_eq!(err.message, "Invalid image");
        assert_eq!(err.attempt, 2);
    }

    #[test]
    fn terminal_states_are_write_once() {
        let mut rec = pending();
        rec.start_attempt(Utc::now()).unwrap();
        rec.succeed(payload(), Utc::now()).unwrap();

        assert_matches!(rec.fail("late", Utc::now()), Err(CoreError::Conflict(_)));
        assert_matches!(
            rec.enter_stage(Stage::Finalizing, Utc::now()),
            Err(CoreError::Conflict(_))
        );
        assert_matches!(rec.start_attempt(Utc::now()), Err(CoreError::Conflict(_)));
        assert_eq!(rec.payload(), Some(&payload()));
        assert_eq!(rec.attempt, 1);
    }

    #[test]
    fn pending_cannot_skip_running() {
        let mut rec = pending();
        assert_matches!(
            rec.enter_stage(Stage::LoadingImage, Utc::now()),
            Err(CoreError::Conflict(_))
        );
        assert_matches!(rec.succeed(payload(), Utc::now()), Err(CoreError::Conflict(_)));
        assert_eq!(rec.status(), JobStatus::Pending);
    }

    #[test]
    fn transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Progress));
        assert!(Progress.can_transition_to(Progress));
        assert!(Progress.can_transition_to(Running));
        assert!(Progress.can_transition_to(Failed));
        for next in [Pending, Running, Progress, Succeeded, Failed] {
            assert!(!Succeeded.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }
}
