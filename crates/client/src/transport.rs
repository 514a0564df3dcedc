// crates/client/src/transport.rs
//! The two read paths a progress client can use.
//!
//! [`ProgressTransport`] abstracts the push path (durable event stream)
//! and the pull path (point-in-time status poll) so the client state
//! machine can be driven by the real HTTP transport or by in-process
//! fakes in tests. [`HttpTransport`] is the production implementation:
//! SSE over reqwest for push, a JSON GET for pull.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use packetpress_jobs::{JobId, JobStatus, ProgressEvent};
use thiserror::Error;

use crate::sse::SseDecoder;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The push path could not be established at all.
    #[error("push path unavailable: {0}")]
    PushUnavailable(String),

    /// The push path dropped mid-stream.
    #[error("push stream interrupted: {0}")]
    PushInterrupted(String),

    /// A pull-path status request failed.
    #[error("status request failed: {0}")]
    Status(String),

    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Push + pull access to one job's event sequence.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    type Push: Stream<Item = Result<ProgressEvent, TransportError>> + Send + Unpin;

    /// Open the push path. The returned stream ends after the terminal
    /// event (server-closed); any error before that point means the
    /// caller should fall back to polling.
    async fn open_push(&self, job_id: JobId) -> Result<Self::Push, TransportError>;

    /// Pull path: current status snapshot. Safe to call repeatedly and
    /// never behind the most recent push message.
    async fn poll_status(&self, job_id: JobId) -> Result<JobStatus, TransportError>;
}

/// HTTP transport against the packetpress server API.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base: String,
}

impl HttpTransport {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }
}

#[async_trait]
impl ProgressTransport for HttpTransport {
    type Push = BoxStream<'static, Result<ProgressEvent, TransportError>>;

    async fn open_push(&self, job_id: JobId) -> Result<Self::Push, TransportError> {
        let resp = self
            .http
            .get(format!("{}/api/jobs/{}/events", self.base, job_id))
            .send()
            .await
            .map_err(|e| TransportError::PushUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::PushUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let mut body = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for data in decoder.feed(&bytes) {
                            yield serde_json::from_str::<ProgressEvent>(&data)
                                .map_err(TransportError::from);
                        }
                    }
                    Err(err) => {
                        yield Err(TransportError::PushInterrupted(err.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn poll_status(&self, job_id: JobId) -> Result<JobStatus, TransportError> {
        let resp = self
            .http
            .get(format!("{}/api/jobs/{}", self.base, job_id))
            .send()
            .await
            .map_err(|e| TransportError::Status(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(format!("status {}", resp.status())));
        }
        resp.json::<JobStatus>()
            .await
            .map_err(|e| TransportError::Status(e.to_string()))
    }
}
