// crates/jobs/src/record.rs
//! Durable record of a job's identity and current status.
//!
//! [`JobRecord`] is the source of truth for the pull path and for
//! subscribers that attach mid-job. All mutation goes through
//! [`JobRecord::apply`], which enforces the protocol invariants:
//! monotonic state transitions, a total that is fixed once observed,
//! and a completed counter that never decreases.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::types::{percent, JobId, JobKind, JobState, JobStatus, ProgressEvent, ProtocolError};

/// Immutable job identity plus the lock-guarded mutable status projection.
pub struct JobRecord {
    id: JobId,
    kind: JobKind,
    /// Opaque target identifier (e.g. a household-set key). Used only for
    /// start-conflict detection; never interpreted here.
    target: String,
    /// Opaque owner/session reference, not interpreted here.
    owner: Option<String>,
    created_at: DateTime<Utc>,
    status: RwLock<JobStatus>,
}

impl JobRecord {
    pub fn new(id: JobId, kind: JobKind, target: impl Into<String>, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            target: target.into(),
            owner,
            created_at: now,
            status: RwLock::new(JobStatus {
                job_id: id,
                kind,
                state: JobState::Pending,
                completed: 0,
                total: 0,
                percent: 0,
                error: None,
                result: None,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Point-in-time copy of the current status.
    pub fn snapshot(&self) -> JobStatus {
        match self.status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::error!(job_id = %self.id, "status lock poisoned on read");
                poisoned.into_inner().clone()
            }
        }
    }

    /// Whether the job has reached `done` or `failed`.
    pub fn is_terminal(&self) -> bool {
        self.snapshot().state.is_terminal()
    }

    /// Fold one event into the status, returning the updated snapshot.
    ///
    /// Rejects events that violate the protocol: anything after a terminal
    /// state, a backward state transition, or a total that differs from the
    /// one already fixed. A decreasing `completed` is clamped rather than
    /// rejected so observers always see non-decreasing progress.
    pub(crate) fn apply(&self, event: &ProgressEvent) -> Result<JobStatus, ProtocolError> {
        let mut status = match self.status.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(job_id = %self.id, "status lock poisoned on write");
                poisoned.into_inner()
            }
        };

        if status.state.is_terminal() {
            return Err(ProtocolError::AfterTerminal {
                state: status.state,
            });
        }
        if event.state.rank() < status.state.rank() {
            return Err(ProtocolError::BackwardState {
                from: status.state,
                to: event.state,
            });
        }
        if status.total != 0 && event.total != 0 && event.total != status.total {
            return Err(ProtocolError::TotalChanged {
                was: status.total,
                got: event.total,
            });
        }

        if status.total == 0 && event.total != 0 {
            status.total = event.total;
        }

        let mut completed = event.completed;
        if completed < status.completed {
            tracing::debug!(
                job_id = %self.id,
                was = status.completed,
                got = completed,
                "completed decreased; clamping to previous value"
            );
            completed = status.completed;
        }
        if status.total != 0 {
            completed = completed.min(status.total);
        }

        status.state = event.state;
        status.completed = completed;
        status.percent = percent(status.completed, status.total);
        status.updated_at = Utc::now();
        match event.state {
            JobState::Failed => status.error = event.error.clone(),
            JobState::Done => status.result = event.result.clone(),
            _ => {}
        }

        Ok(status.clone())
    }
}
