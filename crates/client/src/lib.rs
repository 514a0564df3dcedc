// crates/client/src/lib.rs
//! Browser-side consumer of the packetpress job-progress protocol.
//!
//! One [`ProgressClient`] per observed job: it opens the SSE push path,
//! falls back to status polling on any push failure, renders progress
//! into a [`ProgressView`], and fires its completion handler exactly
//! once. For print-mode batches, [`SequentialActionRunner`] then prints
//! the generated packets one at a time. [`BusyTracker`] is the
//! page-scoped in-flight request counter behind the global loading
//! overlay.

pub mod busy;
pub mod progress;
pub mod sequential;
pub mod sse;
pub mod transport;

pub use busy::{BusyGuard, BusyTracker};
pub use progress::{Phase, ProgressClient, ProgressClientConfig, ProgressView};
pub use sequential::{
    ActionReport, HttpFetcher, HttpLinkSource, ItemFailure, ItemLinkSource, PrintSurface,
    ResourceFetcher, SequentialActionRunner,
};
pub use sse::SseDecoder;
pub use transport::{HttpTransport, ProgressTransport, TransportError};
