// crates/jobs/src/lib.rs
//! Long-running job progress delivery for packetpress.
//!
//! A batch operation (preparing document packets, reversing a bulk
//! import) runs for seconds to minutes while zero or more browser
//! clients observe live progress. This crate provides the
//! transport-agnostic core:
//!
//! - [`JobRecord`]: durable record of a job's identity and status,
//!   source of truth for polling and late-attaching subscribers
//! - [`ProgressChannel`] / [`ProgressHub`]: per-job fan-out with
//!   write-through persistence, so the pull path never trails the push
//!   path
//! - [`JobRunner`]: wraps an opaque unit-of-work collaborator and
//!   guarantees exactly one terminal event per job
//!
//! The HTTP surface over these lives in `packetpress-server`; the
//! browser-side consumer lives in `packetpress-client`.

pub mod channel;
pub mod record;
pub mod runner;
pub mod types;

pub use channel::{ProgressChannel, ProgressHub};
pub use record::JobRecord;
pub use runner::{JobRunner, ProgressHandle, StartError, DEFAULT_RETENTION};
pub use types::{percent, JobId, JobKind, JobState, JobStatus, ProgressEvent, ProtocolError};
