// crates/client/src/busy.rs
//! Page-session request tracking for the global busy overlay.
//!
//! The original drove a page-wide loading overlay by patching the
//! platform's request function; this is the redesign: an explicit
//! counter of in-flight requests with a debounce window, scoped to one
//! page session. The overlay shows only when requests have been
//! continuously in flight for longer than the debounce, which keeps
//! sub-debounce requests from flashing it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default time requests must be continuously in flight before the
/// overlay appears.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct BusyTracker {
    active: AtomicUsize,
    /// Set when the count went 0 → 1; cleared when it returns to 0.
    busy_since: Mutex<Option<Instant>>,
    debounce: Duration,
}

impl BusyTracker {
    pub fn new() -> Arc<Self> {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            busy_since: Mutex::new(None),
            debounce,
        })
    }

    /// Track one outgoing request; the guard ends it on drop.
    pub fn track(self: &Arc<Self>) -> BusyGuard {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            *self.since() = Some(Instant::now());
        }
        BusyGuard {
            tracker: Arc::clone(self),
        }
    }

    fn since(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.busy_since
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the overlay should currently be visible.
    pub fn overlay_visible(&self) -> bool {
        if self.active.load(Ordering::SeqCst) == 0 {
            return false;
        }
        self.since()
            .map(|since| since.elapsed() >= self.debounce)
            .unwrap_or(false)
    }
}

/// Open request handle; dropping it decrements the in-flight count.
pub struct BusyGuard {
    tracker: Arc<BusyTracker>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            *self.tracker.since() = None;
        }
    }
}
