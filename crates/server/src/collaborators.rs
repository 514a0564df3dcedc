// crates/server/src/collaborators.rs
//! HTTP clients for the external services jobs call into, and the
//! executors built on them.
//!
//! The document-render service, the bulk-undo business logic, and the
//! short-lived link issuer are collaborators: opaque request/response
//! calls whose internals are out of scope here.

use async_trait::async_trait;
use packetpress_jobs::{JobId, ProgressHandle};
use serde::{Deserialize, Serialize};

use crate::executor::{JobExecutor, JobSpec, OutputMode};

/// Result payload of a `batch-prepare` job: per-item success/error
/// counts, plus the bulk-download location when that output mode was
/// chosen. Partial failures live here, not in the job state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareSummary {
    pub success: u64,
    pub error: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

/// Client for the document-render service.
#[derive(Clone)]
pub struct DocumentService {
    http: reqwest::Client,
    base: String,
}

impl DocumentService {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    /// Render one packet. `POST {base}/render` with `{target, item}`.
    pub async fn render_packet(&self, target: &str, item: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(format!("{}/render", self.base))
            .json(&serde_json::json!({ "target": target, "item": item }))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("render failed with status {}", resp.status());
        }
        Ok(())
    }

    /// Location of the bulk-download archive for a finished batch.
    /// `POST {base}/bundles` with `{target}`, returns `{url}`.
    pub async fn bundle_location(&self, target: &str) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct Bundle {
            url: String,
        }
        let resp = self
            .http
            .post(format!("{}/bundles", self.base))
            .json(&serde_json::json!({ "target": target }))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Bundle>().await?.url)
    }
}

/// One step of an incremental bulk-undo.
#[derive(Debug, Clone, Deserialize)]
pub struct UndoStep {
    pub completed: u64,
    pub total: u64,
    pub finished: bool,
}

/// Client for the bulk-undo business logic.
#[derive(Clone)]
pub struct UndoService {
    http: reqwest::Client,
    base: String,
}

impl UndoService {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    /// Undo the next slice of the import. `POST {base}/undo/step` with
    /// `{target}`, returns an [`UndoStep`].
    pub async fn step(&self, target: &str) -> anyhow::Result<UndoStep> {
        let resp = self
            .http
            .post(format!("{}/undo/step", self.base))
            .json(&serde_json::json!({ "target": target }))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// Issues short-lived fetchable locations for a job's per-item output.
/// Consumed by the client's sequential print runner.
#[async_trait]
pub trait LinkIssuer: Send + Sync {
    async fn item_link(&self, job_id: JobId, item: &str) -> anyhow::Result<String>;
}

/// Link issuer backed by the file-location collaborator.
pub struct HttpLinkIssuer {
    http: reqwest::Client,
    base: String,
}

impl HttpLinkIssuer {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }
}

#[async_trait]
impl LinkIssuer for HttpLinkIssuer {
    /// `GET {base}/links/{item}?job={id}`, returns `{url}`.
    async fn item_link(&self, job_id: JobId, item: &str) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct Link {
            url: String,
        }
        let resp = self
            .http
            .get(format!("{}/links/{}", self.base, item))
            .query(&[("job", job_id.to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Link>().await?.url)
    }
}

/// Executor for `batch-prepare`: renders one packet per item, counting
/// per-item failures instead of aborting on them.
pub struct PrepareExecutor {
    docs: DocumentService,
}

impl PrepareExecutor {
    pub fn new(docs: DocumentService) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl JobExecutor for PrepareExecutor {
    async fn execute(
        &self,
        spec: JobSpec,
        progress: ProgressHandle,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let total = spec.items.len() as u64;
        let mut success = 0u64;
        let mut error = 0u64;

        for (i, item) in spec.items.iter().enumerate() {
            match self.docs.render_packet(&spec.target, item).await {
                Ok(()) => success += 1,
                Err(err) => {
                    error += 1;
                    tracing::warn!(item = %item, error = %err, "packet render failed");
                }
            }
            progress.report(i as u64 + 1, total);
        }

        // Only the bulk-download mode needs a file location; the print
        // mode fetches per-item links after completion.
        let download = match spec.output_mode {
            Some(OutputMode::Download) => Some(self.docs.bundle_location(&spec.target).await?),
            _ => None,
        };

        let summary = PrepareSummary {
            success,
            error,
            download,
        };
        Ok(Some(serde_json::to_value(summary)?))
    }
}

/// Executor for `bulk-undo`: drives the undo collaborator step by step,
/// forwarding its own progress accounting.
pub struct UndoExecutor {
    undo: UndoService,
}

impl UndoExecutor {
    pub fn new(undo: UndoService) -> Self {
        Self { undo }
    }
}

#[async_trait]
impl JobExecutor for UndoExecutor {
    async fn execute(
        &self,
        spec: JobSpec,
        progress: ProgressHandle,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        loop {
            let step = self.undo.step(&spec.target).await?;
            progress.report(step.completed, step.total);
            if step.finished {
                return Ok(None);
            }
        }
    }
}
