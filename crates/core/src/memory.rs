//! In-process implementations of the storage seams.
//!
//! Single-process only: records and messages live as long as the process.
//! Used by tests and by local runs that embed the worker in the API process.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::analysis::AnalysisResult;
use crate::error::CoreError;
use crate::job::{JobMessage, JobRecord, JobStatus};
use crate::stage::Stage;
use crate::store::{Delivery, JobQueue, ResultStore, StoreError, WorkerRegistry};
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Result store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryResultStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Apply `f` to a non-terminal record. Returns `Ok(false)` when the
    /// record is missing, terminal, or the transition is illegal.
    async fn update<F>(&self, id: JobId, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), CoreError> + Send,
    {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.is_terminal() {
            return Ok(false);
        }
        Ok(f(record).is_ok())
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert_pending(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn discard_pending(&self, id: JobId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get(&id) {
            Some(r) if r.status() == JobStatus::Pending => {
                records.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn start_attempt(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(None);
        };
        match record.start_attempt(Utc::now()) {
            Ok(_) => Ok(Some(record.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn record_progress(&self, id: JobId, stage: Stage) -> Result<bool, StoreError> {
        self.update(id, |r| r.enter_stage(stage, Utc::now())).await
    }

    async fn complete(&self, id: JobId, payload: &AnalysisResult) -> Result<bool, StoreError> {
        let payload = payload.clone();
        self.update(id, move |r| r.succeed(payload, Utc::now())).await
    }

    async fn fail(&self, id: JobId, message: &str) -> Result<bool, StoreError> {
        self.update(id, |r| r.fail(message, Utc::now())).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

struct Entry {
    tag: i64,
    message: JobMessage,
    visible_at: Instant,
    lease: Option<(uuid::Uuid, Instant)>,
    deliveries: u32,
}

impl Entry {
    fn claimable(&self, now: Instant) -> bool {
        let lease_free = match self.lease {
            None => true,
            Some((_, until)) => until <= now,
        };
        lease_free && self.visible_at <= now
    }

    fn held_by(&self, token: uuid::Uuid) -> bool {
        matches!(self.lease, Some((t, _)) if t == token)
    }
}

#[derive(Default)]
struct QueueState {
    next_tag: i64,
    entries: VecDeque<Entry>,
}

/// FIFO queue with leases and delayed visibility.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet acknowledged (claimed or not).
    pub async fn depth(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, message: &JobMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.next_tag += 1;
        let tag = state.next_tag;
        state.entries.push_back(Entry {
            tag,
            message: message.clone(),
            visible_at: Instant::now(),
            lease: None,
            deliveries: 0,
        });
        Ok(())
    }

    async fn claim(
        &self,
        _consumer: &str,
        lease: Duration,
    ) -> Result<Option<Delivery>, StoreError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.iter_mut().find(|e| e.claimable(now)) else {
            return Ok(None);
        };
        let token = uuid::Uuid::new_v4();
        entry.lease = Some((token, now + lease));
        entry.deliveries += 1;
        Ok(Some(Delivery {
            tag: entry.tag,
            lease_token: token,
            message: entry.message.clone(),
            delivery_count: entry.deliveries,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .entries
            .retain(|e| !(e.tag == delivery.tag && e.held_by(delivery.lease_token)));
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.tag == delivery.tag && e.held_by(delivery.lease_token))
        {
            entry.lease = None;
            entry.visible_at = Instant::now() + delay;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryWorkerRegistry {
    seen: RwLock<HashMap<String, Instant>>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn heartbeat(&self, worker: &str) -> Result<(), StoreError> {
        self.seen
            .write()
            .await
            .insert(worker.to_string(), Instant::now());
        Ok(())
    }

    async fn live_workers(&self, within: Duration) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let seen = self.seen.read().await;
        let mut live: Vec<(&String, &Instant)> = seen
            .iter()
            .filter(|(_, at)| now.duration_since(**at) <= within)
            .collect();
        live.sort_by(|a, b| b.1.cmp(a.1));
        Ok(live.into_iter().map(|(name, _)| name.clone()).collect())
    }
}
