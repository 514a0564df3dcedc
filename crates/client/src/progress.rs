// crates/client/src/progress.rs
//! Progress rendering for one job: push-first, poll-fallback, and a
//! one-way terminal gate.
//!
//! The original UI scattered "has this already fired" flags across
//! event-stream callbacks and ad-hoc timers; here the client is an
//! explicit state machine. The push listener and the poll timer are
//! mutually exclusive for a given job (running both would double-fire
//! UI updates), and entering the terminal phase is irreversible no
//! matter how many terminal events arrive across both paths.

use std::time::Duration;

use futures_util::StreamExt;
use packetpress_jobs::{percent, JobId, JobState, ProgressEvent};

use crate::transport::ProgressTransport;

/// UI surface updated as events arrive. Implemented by the embedding
/// page (progress bar, completion banner, retry affordance).
pub trait ProgressView {
    /// A non-terminal tick. `percent` is already clamped: it never
    /// decreases across the life of the job.
    fn render(&mut self, percent: u8, event: &ProgressEvent);

    /// The job finished; hide progress chrome and show the final
    /// message (e.g. "Finished Preparing (9/10) Packets").
    fn completed(&mut self, event: &ProgressEvent);

    /// The job failed. Shows `message` and re-enables any retry
    /// affordance. Implementations must not reset the bar to zero;
    /// previously displayed partial progress stays visible.
    fn failed(&mut self, message: &str, event: &ProgressEvent);
}

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingFirstTick,
    Rendering,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct ProgressClientConfig {
    /// Pull-path cadence once the push path has been given up on.
    pub poll_interval: Duration,
    /// A push connection with no message at all within this bound is
    /// treated as failed and triggers fallback.
    pub first_event_timeout: Duration,
}

impl Default for ProgressClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            first_event_timeout: Duration::from_secs(10),
        }
    }
}

type TerminalHandler = Box<dyn FnOnce(ProgressEvent) + Send>;

/// Drives one job's progress into a [`ProgressView`] until terminal.
pub struct ProgressClient<T, V> {
    job_id: JobId,
    transport: T,
    view: V,
    config: ProgressClientConfig,
    phase: Phase,
    /// Largest total ever observed; the displayed total never shrinks.
    total_seen: u64,
    /// Largest percentage ever shown; the bar never moves backward.
    percent_shown: u8,
    terminal: Option<ProgressEvent>,
    on_terminal: Option<TerminalHandler>,
}

impl<T, V> ProgressClient<T, V>
where
    T: ProgressTransport,
    V: ProgressView,
{
    pub fn new(job_id: JobId, transport: T, view: V) -> Self {
        Self {
            job_id,
            transport,
            view,
            config: ProgressClientConfig::default(),
            phase: Phase::Idle,
            total_seen: 0,
            percent_shown: 0,
            terminal: None,
            on_terminal: None,
        }
    }

    pub fn with_config(mut self, config: ProgressClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Completion handler, fired exactly once on entering the terminal
    /// phase (done or failed), regardless of which path detected it.
    pub fn on_terminal(mut self, handler: impl FnOnce(ProgressEvent) + Send + 'static) -> Self {
        self.on_terminal = Some(Box::new(handler));
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run to terminal state and return the terminal event.
    ///
    /// Push first; on open failure, silence, decode error, or a stream
    /// that closes without a terminal event, the push path is abandoned
    /// and fixed-interval polling takes over until the job terminates.
    /// The fallback is invisible to the job itself.
    pub async fn run(mut self) -> ProgressEvent {
        self.phase = Phase::AwaitingFirstTick;

        match self.transport.open_push(self.job_id).await {
            Ok(push) => {
                if let Some(terminal) = self.drive_push(push).await {
                    return terminal;
                }
                tracing::debug!(job_id = %self.job_id, "push path gave out; falling back to polling");
            }
            Err(err) => {
                tracing::debug!(job_id = %self.job_id, error = %err, "push path failed to open; falling back to polling");
            }
        }

        self.drive_poll().await
    }

    async fn drive_push(&mut self, mut push: T::Push) -> Option<ProgressEvent> {
        let mut first = true;
        loop {
            let next = if first {
                match tokio::time::timeout(self.config.first_event_timeout, push.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        tracing::warn!(job_id = %self.job_id, "push path silent past first-event bound");
                        return None;
                    }
                }
            } else {
                push.next().await
            };
            first = false;

            match next {
                Some(Ok(event)) => {
                    if self.observe(event) {
                        return self.terminal.clone();
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(job_id = %self.job_id, error = %err, "push stream error");
                    return None;
                }
                // Server closed the stream. Terminal if the gate was
                // crossed, otherwise a silent drop worth falling back on.
                None => return self.terminal.clone(),
            }
        }
    }

    async fn drive_poll(&mut self) -> ProgressEvent {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            interval.tick().await;
            match self.transport.poll_status(self.job_id).await {
                Ok(status) => {
                    if self.observe(ProgressEvent::from(&status)) {
                        if let Some(terminal) = self.terminal.clone() {
                            return terminal;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(job_id = %self.job_id, error = %err, "status poll failed; will retry");
                }
            }
        }
    }

    /// Fold one event into the view. Returns true once terminal.
    fn observe(&mut self, event: ProgressEvent) -> bool {
        // One-way gate: everything after the first terminal event is a
        // no-op, including a duplicate terminal from the other path.
        if self.phase == Phase::Terminal {
            return true;
        }

        if event.total > self.total_seen {
            self.total_seen = event.total;
        }
        let total = self.total_seen;
        let completed = if total != 0 {
            event.completed.min(total)
        } else {
            event.completed
        };
        self.percent_shown = self.percent_shown.max(percent(completed, total));

        match event.state {
            JobState::Done => {
                self.phase = Phase::Terminal;
                self.view.completed(&event);
                self.fire_handler(event);
                true
            }
            JobState::Failed => {
                self.phase = Phase::Terminal;
                let message = event
                    .error
                    .clone()
                    .unwrap_or_else(|| "the operation failed".to_string());
                self.view.failed(&message, &event);
                self.fire_handler(event);
                true
            }
            JobState::Pending | JobState::Running => {
                self.phase = Phase::Rendering;
                self.view.render(self.percent_shown, &event);
                false
            }
        }
    }

    fn fire_handler(&mut self, event: ProgressEvent) {
        self.terminal = Some(event.clone());
        if let Some(handler) = self.on_terminal.take() {
            handler(event);
        }
    }
}
