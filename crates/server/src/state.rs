// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use packetpress_jobs::JobRunner;

use crate::collaborators::LinkIssuer;
use crate::executor::ExecutorRegistry;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job runner: per-job channels, record store, terminal guarantees.
    pub runner: Arc<JobRunner>,
    /// Kind-keyed unit-of-work executors, fixed at startup.
    pub executors: ExecutorRegistry,
    /// Collaborator that issues short-lived per-item resource links.
    pub links: Arc<dyn LinkIssuer>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(executors: ExecutorRegistry, links: Arc<dyn LinkIssuer>) -> Arc<Self> {
        Self::with_runner(Arc::new(JobRunner::new()), executors, links)
    }

    /// Create with an externally-provided runner (tests use a short
    /// retention window).
    pub fn with_runner(
        runner: Arc<JobRunner>,
        executors: ExecutorRegistry,
        links: Arc<dyn LinkIssuer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            runner,
            executors,
            links,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use packetpress_jobs::JobId;

    struct NoLinks;

    #[async_trait]
    impl LinkIssuer for NoLinks {
        async fn item_link(&self, _job_id: JobId, _item: &str) -> anyhow::Result<String> {
            anyhow::bail!("no link issuer configured")
        }
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(ExecutorRegistry::new(), Arc::new(NoLinks));
        assert!(state.uptime_secs() < 1);
    }
}
