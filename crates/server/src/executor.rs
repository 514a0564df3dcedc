// crates/server/src/executor.rs
//! The seam between the job runner and collaborator business logic.
//!
//! A [`JobExecutor`] is the opaque unit of work behind one job kind. It
//! reports `(completed, total)` pairs through the [`ProgressHandle`] at
//! its own cadence and returns the result payload attached to the `done`
//! event. Executors are registered per kind at startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use packetpress_jobs::{JobKind, ProgressHandle};
use serde::{Deserialize, Serialize};

/// How a finished batch is handed to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Bundle everything into one downloadable archive.
    Download,
    /// The client prints each item sequentially after completion.
    Print,
}

/// Request payload for starting a job, handed through to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub kind: JobKind,
    /// Opaque target identifier; one running job per target.
    pub target: String,
    /// Opaque owner/session reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Item ids the batch operates on (one packet per item).
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mode: Option<OutputMode>,
}

/// One job kind's unit of work.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run the batch. Per-item failures that leave the batch usable are
    /// data in the returned payload; returning `Err` fails the whole job.
    async fn execute(
        &self,
        spec: JobSpec,
        progress: ProgressHandle,
    ) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Kind-keyed executor lookup, fixed at startup.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobKind, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: JobKind, executor: Arc<dyn JobExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&kind).cloned()
    }
}
