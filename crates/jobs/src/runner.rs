// crates/jobs/src/runner.rs
//! Spawns unit-of-work collaborators and guarantees a terminal event.
//!
//! [`JobRunner`] owns the [`ProgressHub`] and is the only component that
//! creates jobs. The collaborator itself is opaque: it receives a
//! [`ProgressHandle`] to report `(completed, total)` pairs at its own
//! cadence and returns an optional result payload. Whether the
//! collaborator returns, errors, or panics, the job reaches exactly one
//! terminal state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::channel::{ProgressChannel, ProgressHub};
use crate::record::JobRecord;
use crate::types::{JobId, JobKind, JobStatus, ProgressEvent};

/// How long terminal records stay discoverable via the pull path, so a
/// client that reloads the page can still observe completion.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Starting a job can fail synchronously; everything later is reported
/// through the job's own terminal event.
#[derive(Debug, Error, PartialEq)]
pub enum StartError {
    #[error("a job is already running for this target (job {existing})")]
    Conflict { existing: JobId },
}

/// Handed to the collaborator for progress reporting. Holds no authority
/// over the job beyond publishing ticks.
#[derive(Clone)]
pub struct ProgressHandle {
    hub: Arc<ProgressHub>,
    job_id: JobId,
}

impl ProgressHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report `(completed, total)`. A rejected tick (protocol violation,
    /// evicted job) is logged and dropped; the collaborator keeps running.
    pub fn report(&self, completed: u64, total: u64) {
        let event = ProgressEvent::running(self.job_id, completed, total);
        if let Err(err) = self.hub.publish(self.job_id, event) {
            tracing::warn!(job_id = %self.job_id, error = %err, "progress tick dropped");
        }
    }
}

/// Central manager for long-running batch jobs.
pub struct JobRunner {
    hub: Arc<ProgressHub>,
    retention: Duration,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Override the terminal-record retention window (tests, deployments
    /// with tighter memory bounds).
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            hub: Arc::new(ProgressHub::new()),
            retention,
        }
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    /// Start a job for `target`, running `work` on the tokio runtime.
    ///
    /// Returns the new job id, or [`StartError::Conflict`] when a
    /// non-terminal job already exists for the same target; two runners
    /// must never race on the same underlying data.
    ///
    /// The spawned task publishes `running`, awaits the collaborator, and
    /// then publishes exactly one terminal event: `done` with the
    /// collaborator's result, or `failed` with its error (a panic is
    /// caught via the join handle and reported the same way). After the
    /// retention window the record is evicted.
    pub fn start<F, Fut>(
        &self,
        kind: JobKind,
        target: impl Into<String>,
        owner: Option<String>,
        work: F,
    ) -> Result<JobId, StartError>
    where
        F: FnOnce(ProgressHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<serde_json::Value>>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let record = Arc::new(JobRecord::new(id, kind, target, owner));
        let channel = Arc::new(ProgressChannel::new(record));

        self.hub
            .try_register(channel)
            .map_err(|existing| StartError::Conflict { existing })?;

        let hub = Arc::clone(&self.hub);
        let retention = self.retention;
        tokio::spawn(async move {
            if let Err(err) = hub.publish(id, ProgressEvent::running(id, 0, 0)) {
                tracing::error!(job_id = %id, error = %err, "failed to mark job running");
            }

            let handle = ProgressHandle {
                hub: Arc::clone(&hub),
                job_id: id,
            };
            // The collaborator runs in its own task so a panic is
            // contained and still produces a terminal event.
            let outcome = tokio::spawn(work(handle)).await;

            let snapshot = hub.status(id);
            let (completed, total) = match &snapshot {
                Some(s) => (s.completed, s.total),
                None => (0, 0),
            };

            let terminal = match outcome {
                Ok(Ok(result)) => {
                    // A finished job is fully complete by definition.
                    let completed = if total != 0 { total } else { completed };
                    ProgressEvent::done(id, completed, total, result)
                }
                Ok(Err(err)) => {
                    tracing::warn!(job_id = %id, error = %err, "job failed");
                    ProgressEvent::failed(id, completed, total, err.to_string())
                }
                Err(join_err) => {
                    tracing::error!(job_id = %id, error = %join_err, "job task panicked");
                    ProgressEvent::failed(id, completed, total, "job crashed unexpectedly")
                }
            };
            if let Err(err) = hub.publish(id, terminal) {
                tracing::error!(job_id = %id, error = %err, "failed to publish terminal event");
            }

            tokio::time::sleep(retention).await;
            hub.remove(id);
            tracing::debug!(job_id = %id, "terminal record evicted");
        });

        Ok(id)
    }

    /// Current status snapshot (pull path).
    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.hub.status(job_id)
    }

    /// Subscribe to a job's events (push path).
    pub fn subscribe(
        &self,
        job_id: JobId,
    ) -> Option<impl futures_util::Stream<Item = ProgressEvent> + Send + 'static> {
        self.hub.subscribe(job_id)
    }

    /// Whether a job has reached `done` or `failed`.
    pub fn is_terminal(&self, job_id: JobId) -> bool {
        self.status(job_id)
            .map(|s| s.state.is_terminal())
            .unwrap_or(false)
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
