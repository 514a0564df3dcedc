// crates/server/src/main.rs
//! Packetpress server binary.
//!
//! Wires the collaborator service clients (document render, bulk undo,
//! link issuer) into the executor registry and serves the job-progress
//! API. Collaborator base URLs come from the environment.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use packetpress_jobs::JobKind;
use packetpress_server::collaborators::{
    DocumentService, HttpLinkIssuer, PrepareExecutor, UndoExecutor, UndoService,
};
use packetpress_server::executor::ExecutorRegistry;
use packetpress_server::{create_app, AppState};

/// Default port for the server.
const DEFAULT_PORT: u16 = 47911;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("PACKETPRESS_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let docs_url = require_env("PACKETPRESS_DOCS_URL")?;
    let undo_url = require_env("PACKETPRESS_UNDO_URL")?;
    let links_url = require_env("PACKETPRESS_LINKS_URL")?;

    let registry = ExecutorRegistry::new()
        .register(
            JobKind::BatchPrepare,
            Arc::new(PrepareExecutor::new(DocumentService::new(docs_url))),
        )
        .register(
            JobKind::BulkUndo,
            Arc::new(UndoExecutor::new(UndoService::new(undo_url))),
        );

    let state = AppState::new(registry, Arc::new(HttpLinkIssuer::new(links_url)));
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], get_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "packetpress server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
