// crates/jobs/src/types.rs
//! Wire types for the job-progress protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job. Immutable once created.
pub type JobId = Uuid;

/// What a job does. New batch operations add a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Prepare one document packet per item (per household).
    BatchPrepare,
    /// Reverse a bulk data import.
    BulkUndo,
}

/// Lifecycle state of a job. Transitions are monotonic:
/// `pending → running → {done | failed}`, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Position in the monotonic transition order.
    pub(crate) fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Done | JobState::Failed => 2,
        }
    }
}

/// Percentage derived from a `(completed, total)` pair.
/// Zero while the total is still unknown.
pub fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u8
    }
}

/// Mutable projection of a job's progress, returned by the pull path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    /// Units of work finished so far. Never decreases.
    pub completed: u64,
    /// Units of work planned. Fixed at the first non-zero observation.
    pub total: u64,
    /// `round(completed / total * 100)`, 0 while total is unknown.
    pub percent: u8,
    /// Only set when `state == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque payload attached at completion (e.g. success/error counts,
    /// a bulk-download location).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// One wire message about a job. Delivery on the push path is
/// at-least-once; the terminal event is always observable via the
/// pull path even if the push path never delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub state: JobState,
    pub completed: u64,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl ProgressEvent {
    /// A non-terminal progress tick.
    pub fn running(job_id: JobId, completed: u64, total: u64) -> Self {
        Self {
            job_id,
            state: JobState::Running,
            completed,
            total,
            error: None,
            result: None,
        }
    }

    /// The successful terminal event, carrying the job-kind-defined result.
    pub fn done(job_id: JobId, completed: u64, total: u64, result: Option<serde_json::Value>) -> Self {
        Self {
            job_id,
            state: JobState::Done,
            completed,
            total,
            error: None,
            result,
        }
    }

    /// The failed terminal event, carrying a human-readable error.
    pub fn failed(job_id: JobId, completed: u64, total: u64, error: impl Into<String>) -> Self {
        Self {
            job_id,
            state: JobState::Failed,
            completed,
            total,
            error: Some(error.into()),
            result: None,
        }
    }
}

impl From<&JobStatus> for ProgressEvent {
    /// Synthesize an event from a status snapshot, used when a subscriber
    /// attaches mid-job and for the poll fallback.
    fn from(status: &JobStatus) -> Self {
        Self {
            job_id: status.job_id,
            state: status.state,
            completed: status.completed,
            total: status.total,
            error: status.error.clone(),
            result: status.result.clone(),
        }
    }
}

/// Protocol violations rejected by the record store. A misbehaving
/// publisher is surfaced here instead of silently corrupting observers.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("total changed mid-job: was {was}, got {got}")]
    TotalChanged { was: u64, got: u64 },

    #[error("state moved backward: {from:?} -> {to:?}")]
    BackwardState { from: JobState, to: JobState },

    #[error("event published after terminal state {state:?}")]
    AfterTerminal { state: JobState },

    #[error("unknown job: {0}")]
    UnknownJob(JobId),
}
