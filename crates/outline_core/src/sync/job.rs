//! Deferred persistence payloads and the post-commit outbox.
//!
//! # Responsibility
//! - Describe what the persistence collaborator receives after a submit.
//! - Queue jobs until their dispatch time and hand them out once.
//!
//! # Invariants
//! - Payloads are snapshots taken when the job is scheduled.
//! - A drained job is never re-queued; failed dispatches are not retried.

use crate::model::item::{ContextChild, Item, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One item plus the context children lists a submit changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub item: Item,
    /// Encoded context path -> full updated child list.
    pub context_updates: BTreeMap<String, Vec<ContextChild>>,
}

impl SyncPayload {
    pub fn new(item: Item, context_updates: BTreeMap<String, Vec<ContextChild>>) -> Self {
        Self {
            item,
            context_updates,
        }
    }
}

/// Scheduled dispatch of one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub job_id: Uuid,
    /// Graph revision that produced the payload.
    pub revision: u64,
    pub payload: SyncPayload,
    /// Earliest dispatch time in epoch milliseconds.
    pub not_before_ms: Timestamp,
}

impl SyncJob {
    pub fn new(revision: u64, payload: SyncPayload, not_before_ms: Timestamp) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            revision,
            payload,
            not_before_ms,
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.not_before_ms <= now
    }
}

/// Failure reported by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
    /// Collaborator that failed.
    pub sink: String,
    /// Stable machine-readable code.
    pub code: String,
    pub message: String,
}

impl SyncError {
    pub fn new(sink: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.sink, self.code, self.message)
    }
}

impl Error for SyncError {}

/// External collaborator that durably stores submitted records.
pub trait PersistenceSink {
    /// Stable sink identifier used for registration and logs.
    fn sink_id(&self) -> &str;
    /// Stores one payload. Called at most once per job.
    fn sync_one(&self, job: &SyncJob) -> Result<(), SyncError>;
}

/// FIFO outbox filled after each commit and drained by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SyncQueue {
    jobs: VecDeque<SyncJob>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: SyncJob) {
        self.jobs.push_back(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &SyncJob> {
        self.jobs.iter()
    }

    /// Removes and returns jobs due at `now`, keeping submit order.
    ///
    /// Jobs are scheduled with non-decreasing `not_before_ms`, so draining
    /// stops at the first job that is not yet due.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<SyncJob> {
        let mut due = Vec::new();
        while self.jobs.front().is_some_and(|job| job.is_due(now)) {
            if let Some(job) = self.jobs.pop_front() {
                due.push(job);
            }
        }
        due
    }

    /// Removes and returns every queued job regardless of schedule.
    pub fn drain_all(&mut self) -> Vec<SyncJob> {
        self.jobs.drain(..).collect()
    }
}
