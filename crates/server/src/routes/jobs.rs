// crates/server/src/routes/jobs.rs
//! The transport bridge: both read paths over one job's event sequence.
//!
//! - `POST /jobs`: start a job (409 on target conflict)
//! - `GET  /jobs/{id}`: pull path, point-in-time status
//! - `GET  /jobs/{id}/events`: push path, SSE closed after terminal
//! - `GET  /jobs/{id}/items/{item}/link`: short-lived per-item resource link
//!
//! The push path can fail to establish or drop silently; the pull path is
//! the fallback of record and, because every publish writes through to the
//! record before fan-out, it is never behind what was pushed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use packetpress_jobs::{JobId, JobStatus};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::executor::JobSpec;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct StartResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct LinkResponse {
    pub url: String,
}

/// POST /api/jobs: start a job for a target.
///
/// Rejects with 409 when a job is already running for the target, so two
/// runners can never race on the same underlying data.
async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<JobSpec>,
) -> ApiResult<Json<StartResponse>> {
    let executor = state
        .executors
        .get(spec.kind)
        .ok_or(ApiError::UnknownKind(spec.kind))?;

    let job_id = state.runner.start(
        spec.kind,
        spec.target.clone(),
        spec.owner.clone(),
        move |progress| async move { executor.execute(spec, progress).await },
    )?;

    tracing::info!(job_id = %job_id, "job started");
    Ok(Json(StartResponse { job_id }))
}

/// GET /api/jobs/{id}: pull path. Safe to call repeatedly; reflects at
/// least as much progress as the most recent push message.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobStatus>> {
    state
        .runner
        .status(id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// GET /api/jobs/{id}/events: push path.
///
/// One ProgressEvent JSON per SSE message. The first message is a
/// snapshot of the current status so a client attaching mid-job renders
/// immediately. The server closes the stream after the terminal event.
async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let events = state.runner.subscribe(id).ok_or(ApiError::JobNotFound(id))?;

    let stream = events.map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// GET /api/jobs/{id}/items/{item}/link: short-lived fetchable location
/// for one item's rendered output (collaborator-owned).
async fn item_link(
    State(state): State<Arc<AppState>>,
    Path((id, item)): Path<(JobId, String)>,
) -> ApiResult<Json<LinkResponse>> {
    // The job must at least still be discoverable.
    state.runner.status(id).ok_or(ApiError::JobNotFound(id))?;

    let url = state
        .links
        .item_link(id, &item)
        .await
        .map_err(|e| ApiError::Collaborator(e.to_string()))?;
    Ok(Json(LinkResponse { url }))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(start_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(stream_job))
        .route("/jobs/{id}/items/{item}/link", get(item_link))
}
