// crates/client/src/sequential.rs
//! Completion-triggered per-item actions, strictly one at a time.
//!
//! When a finished batch was configured for printing, each generated
//! packet is printed in turn: fetch a short-lived link for the item,
//! pull the resource fully into memory, render it on an isolated
//! invisible surface, and wait for the platform print action to be
//! dispatched before moving on. The print facility is a single shared
//! resource, so the loop never overlaps prints, and a failed item is
//! logged and skipped, never aborting the rest of the run.

use async_trait::async_trait;
use bytes::Bytes;
use packetpress_jobs::JobId;

/// Resolves an item to a short-lived fetchable location
/// (collaborator-owned; see the server's per-item link endpoint).
#[async_trait]
pub trait ItemLinkSource: Send + Sync {
    async fn item_link(&self, job_id: JobId, item: &str) -> anyhow::Result<String>;
}

/// Fetches a resource fully into local memory.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Bytes>;
}

/// An isolated render surface with a print action. `print` resolves
/// once the platform print has been dispatched for the document, at
/// which point the surface may be reused for the next item.
#[async_trait]
pub trait PrintSurface: Send {
    async fn print(&mut self, item: &str, document: Bytes) -> anyhow::Result<()>;
}

/// One item that failed somewhere in link-fetch-print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of a sequential run. Every item is attempted exactly once.
#[derive(Debug, Default)]
pub struct ActionReport {
    pub attempted: usize,
    pub printed: usize,
    pub failures: Vec<ItemFailure>,
}

/// Runs the per-item follow-up actions for a completed job.
pub struct SequentialActionRunner<L, F, P> {
    links: L,
    fetcher: F,
    surface: P,
}

impl<L, F, P> SequentialActionRunner<L, F, P>
where
    L: ItemLinkSource,
    F: ResourceFetcher,
    P: PrintSurface,
{
    pub fn new(links: L, fetcher: F, surface: P) -> Self {
        Self {
            links,
            fetcher,
            surface,
        }
    }

    /// Print every item in list order, one at a time. Item `i + 1` is
    /// not started until `i` has finished or errored.
    pub async fn run(&mut self, job_id: JobId, items: &[String]) -> ActionReport {
        let mut report = ActionReport::default();
        for item in items {
            report.attempted += 1;
            match self.run_one(job_id, item).await {
                Ok(()) => report.printed += 1,
                Err(err) => {
                    tracing::warn!(item = %item, error = %err, "sequential action failed; continuing");
                    report.failures.push(ItemFailure {
                        item: item.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            job_id = %job_id,
            attempted = report.attempted,
            printed = report.printed,
            failed = report.failures.len(),
            "sequential actions finished"
        );
        report
    }

    async fn run_one(&mut self, job_id: JobId, item: &str) -> anyhow::Result<()> {
        let url = self.links.item_link(job_id, item).await?;
        let document = self.fetcher.fetch(&url).await?;
        self.surface.print(item, document).await
    }
}

/// Link source backed by the packetpress server API.
pub struct HttpLinkSource {
    http: reqwest::Client,
    base: String,
}

impl HttpLinkSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }
}

#[async_trait]
impl ItemLinkSource for HttpLinkSource {
    async fn item_link(&self, job_id: JobId, item: &str) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct Link {
            url: String,
        }
        let resp = self
            .http
            .get(format!("{}/api/jobs/{}/items/{}/link", self.base, job_id, item))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Link>().await?.url)
    }
}

/// Fetcher that pulls the resource over HTTP fully into memory.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Bytes> {
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct FakeLinks {
        /// Items whose link fetch fails.
        broken: Vec<String>,
    }

    #[async_trait]
    impl ItemLinkSource for FakeLinks {
        async fn item_link(&self, _job_id: JobId, item: &str) -> anyhow::Result<String> {
            if self.broken.iter().any(|b| b == item) {
                anyhow::bail!("link issuer returned 502 for {item}")
            }
            Ok(format!("https://files/{item}.pdf"))
        }
    }

    struct FakeFetcher;

    #[async_trait]
    impl ResourceFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> anyhow::Result<Bytes> {
            Ok(Bytes::from(format!("pdf:{url}")))
        }
    }

    /// Records print order and asserts no overlapping invocations.
    #[derive(Clone, Default)]
    struct FakeSurface {
        printed: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl PrintSurface for FakeSurface {
        async fn print(&mut self, item: &str, document: Bytes) -> anyhow::Result<()> {
            {
                let mut busy = self.in_flight.lock().unwrap();
                assert!(!*busy, "print invoked while another print was in flight");
                *busy = true;
            }
            assert!(!document.is_empty());
            // Simulate the wait for the platform print dispatch.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.printed.lock().unwrap().push(item.to_string());
            *self.in_flight.lock().unwrap() = false;
            Ok(())
        }
    }

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_prints_all_items_in_order() {
        let surface = FakeSurface::default();
        let mut runner = SequentialActionRunner::new(
            FakeLinks { broken: vec![] },
            FakeFetcher,
            surface.clone(),
        );

        let report = runner.run(Uuid::new_v4(), &items(&["a", "b", "c"])).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.printed, 3);
        assert!(report.failures.is_empty());
        assert_eq!(*surface.printed.lock().unwrap(), items(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_failed_item_does_not_abort_remaining() {
        let surface = FakeSurface::default();
        let mut runner = SequentialActionRunner::new(
            FakeLinks {
                broken: vec!["b".to_string()],
            },
            FakeFetcher,
            surface.clone(),
        );

        let report = runner.run(Uuid::new_v4(), &items(&["a", "b", "c"])).await;
        // All three attempted exactly once, one logged failure.
        assert_eq!(report.attempted, 3);
        assert_eq!(report.printed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, "b");
        assert_eq!(*surface.printed.lock().unwrap(), items(&["a", "c"]));
    }

    #[tokio::test]
    async fn test_empty_item_list_is_a_noop() {
        let mut runner = SequentialActionRunner::new(
            FakeLinks { broken: vec![] },
            FakeFetcher,
            FakeSurface::default(),
        );
        let report = runner.run(Uuid::new_v4(), &[]).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.printed, 0);
    }

    #[tokio::test]
    async fn test_http_link_source_hits_link_endpoint() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let job_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{job_id}/items/hh-4/link")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://files/hh-4.pdf"})),
            )
            .mount(&server)
            .await;

        let links = HttpLinkSource::new(server.uri());
        let url = links.item_link(job_id, "hh-4").await.unwrap();
        assert_eq!(url, "https://files/hh-4.pdf");
    }
}
