//! The worker consumption loop.
//!
//! Each [`Worker`] is one sequential consumer: claim a message, run one
//! attempt, settle the message (ack or delayed release), repeat. Several
//! instances can share the same stores, queue and analyzer.

use std::sync::Arc;
use std::time::Duration;

use sieve_core::analysis::{AnalysisError, AnalysisResult};
use sieve_core::retry::{RetryDecision, RetryPolicy};
use sieve_core::store::{Delivery, JobQueue, ResultStore};
use sieve_core::types::JobId;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::analyzer::Analyzer;
use crate::error::WorkerError;
use crate::pipeline::{Pipeline, PipelineError};

/// Default polling interval when the queue is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const HARD_LIMIT_MESSAGE: &str = "hard time limit exceeded";

pub const PANIC_MESSAGE: &str = "Analyzer panicked";

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { attempt: u32 },
    /// Released for redelivery after `delay`.
    Retrying { attempt: u32, delay: Duration },
    Failed { attempt: u32 },
    /// Acknowledged without a result of its own: orphan, duplicate,
    /// abandoned, or finished elsewhere mid-attempt.
    Skipped,
}

#[derive(Clone)]
pub struct Worker {
    name: String,
    store: Arc<dyn ResultStore>,
    queue: Arc<dyn JobQueue>,
    analyzer: Arc<dyn Analyzer>,
    policy: RetryPolicy,
    lease: Duration,
    poll_interval: Duration,
}

impl Worker {
    /// Create a worker with the default retry policy and a lease one minute
    /// longer than the hard time limit.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResultStore>,
        queue: Arc<dyn JobQueue>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let policy = RetryPolicy::default();
        Self {
            name: name.into(),
            lease: policy.hard_time_limit + Duration::from_secs(60),
            store,
            queue,
            analyzer,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until `cancel` fires. An in-flight attempt is always finished
    /// before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            worker = %self.name,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker started",
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(worker = %self.name, "Worker shutting down");
                    break;
                }
                _ = ticker.tick() => self.drain(&cancel).await,
            }
        }
    }

    /// Process messages back to back until the queue is empty.
    async fn drain(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(worker = %self.name, error = %e, "Worker cycle failed");
                    break;
                }
            }
        }
    }

    /// Claim and process at most one message. `Ok(None)` means the queue had
    /// nothing visible.
    pub async fn run_once(&self) -> Result<Option<Outcome>, WorkerError> {
        let Some(delivery) = self.queue.claim(&self.name, self.lease).await? else {
            return Ok(None);
        };
        self.process(&delivery).await.map(Some)
    }

    /// Run one attempt for a claimed message and settle it.
    pub async fn process(&self, delivery: &Delivery) -> Result<Outcome, WorkerError> {
        let job_id = delivery.message.job_id;

        let Some(record) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, worker = %self.name, "Orphan message, no job record");
            self.queue.ack(delivery).await?;
            return Ok(Outcome::Skipped);
        };

        if record.is_terminal() {
            tracing::debug!(%job_id, status = record.status().as_str(), "Duplicate delivery of finished job");
            self.queue.ack(delivery).await?;
            return Ok(Outcome::Skipped);
        }

        if self.policy.attempts_exhausted(record.attempt) {
            // Redelivered after the last allowed attempt died with its worker.
            let message = format!(
                "max attempts ({}) exceeded",
                self.policy.max_attempts
            );
            tracing::error!(%job_id, attempt = record.attempt, "{message}");
            self.store.fail(job_id, &message).await?;
            self.queue.ack(delivery).await?;
            return Ok(Outcome::Failed {
                attempt: record.attempt,
            });
        }

        let Some(record) = self.store.start_attempt(job_id).await? else {
            self.queue.ack(delivery).await?;
            return Ok(Outcome::Skipped);
        };
        let attempt = record.attempt;
        tracing::info!(
            %job_id,
            attempt,
            worker = %self.name,
            delivery_count = delivery.delivery_count,
            "Job attempt started",
        );

        let soft_deadline = Instant::now() + self.policy.soft_time_limit;
        let mut attempt_task = self.spawn_attempt(delivery, soft_deadline);

        let limit = self.policy.hard_time_limit;
        let finished = match tokio::time::timeout(limit, &mut attempt_task).await {
            Ok(finished) => finished,
            Err(_) => {
                attempt_task.abort();
                // Wait out the abort so no stage can write after the failure.
                let _ = attempt_task.await;
                tracing::error!(%job_id, attempt, "Hard time limit exceeded");
                self.store.fail(job_id, HARD_LIMIT_MESSAGE).await?;
                self.queue.ack(delivery).await?;
                return Ok(Outcome::Failed { attempt });
            }
        };

        let result = match finished {
            Ok(result) => result,
            Err(join_err) => {
                let error = if join_err.is_panic() {
                    tracing::error!(%job_id, attempt, "Analyzer panicked");
                    AnalysisError::permanent(PANIC_MESSAGE)
                } else {
                    AnalysisError::transient(format!("Attempt task cancelled: {join_err}"))
                };
                return self.settle_failure(delivery, job_id, attempt, error).await;
            }
        };

        match result {
            Ok(payload) => {
                if !self.store.complete(job_id, &payload).await? {
                    tracing::warn!(%job_id, attempt, "Result not written, job already finished");
                    self.queue.ack(delivery).await?;
                    return Ok(Outcome::Skipped);
                }
                tracing::info!(
                    %job_id,
                    attempt,
                    processing_time = payload.processing_time,
                    "Job succeeded",
                );
                self.queue.ack(delivery).await?;
                Ok(Outcome::Succeeded { attempt })
            }
            Err(PipelineError::Abandoned) => {
                tracing::warn!(%job_id, attempt, "Job left in-flight state mid-attempt");
                self.queue.ack(delivery).await?;
                Ok(Outcome::Skipped)
            }
            Err(PipelineError::Store(e)) => {
                let error = AnalysisError::transient(e.to_string());
                self.settle_failure(delivery, job_id, attempt, error).await
            }
            Err(PipelineError::Analysis(error)) => {
                self.settle_failure(delivery, job_id, attempt, error).await
            }
        }
    }

    /// Run the stages on their own task so a panicking analyzer surfaces as
    /// a [`JoinError`](tokio::task::JoinError) instead of unwinding through
    /// this worker.
    fn spawn_attempt(
        &self,
        delivery: &Delivery,
        soft_deadline: Instant,
    ) -> JoinHandle<Result<AnalysisResult, PipelineError>> {
        let store = Arc::clone(&self.store);
        let analyzer = Arc::clone(&self.analyzer);
        let job_id = delivery.message.job_id;
        let image_path = delivery.message.image_path.clone();

        tokio::spawn(async move {
            Pipeline::new(store.as_ref(), analyzer.as_ref(), job_id, soft_deadline)
                .run(&image_path)
                .await
        })
    }

    async fn settle_failure(
        &self,
        delivery: &Delivery,
        job_id: JobId,
        attempt: u32,
        error: AnalysisError,
    ) -> Result<Outcome, WorkerError> {
        match self.policy.decide(&error, attempt) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    %job_id,
                    attempt,
                    error = %error,
                    retry_in_secs = delay.as_secs_f64(),
                    "Transient failure, scheduling retry",
                );
                self.queue.release(delivery, delay).await?;
                Ok(Outcome::Retrying { attempt, delay })
            }
            RetryDecision::Fail => {
                tracing::error!(
                    %job_id,
                    attempt,
                    error = %error,
                    transient = error.is_transient(),
                    "Job failed",
                );
                self.store.fail(job_id, error.message()).await?;
                self.queue.ack(delivery).await?;
                Ok(Outcome::Failed { attempt })
            }
        }
    }
}
