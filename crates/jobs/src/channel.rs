// crates/jobs/src/channel.rs
//! Per-job fan-out of progress events, with write-through persistence.
//!
//! [`ProgressChannel`] pairs one [`JobRecord`] with a tokio broadcast
//! sender. Every publish updates the record first and only then fans out
//! to live subscribers, so the pull path is never behind the push path.
//! [`ProgressHub`] is the id-keyed registry of channels; each channel is
//! independent and no lock spans jobs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::Stream;
use tokio::sync::broadcast;

use crate::record::JobRecord;
use crate::types::{JobId, JobStatus, ProgressEvent, ProtocolError};

/// Buffered events per subscriber. A subscriber that lags past this is
/// skipped forward (drop-for-disconnected, never backpressure on the
/// publisher).
const CHANNEL_CAPACITY: usize = 64;

/// One job's event stream: record write-through plus best-effort fan-out.
pub struct ProgressChannel {
    record: Arc<JobRecord>,
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    pub fn new(record: Arc<JobRecord>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { record, tx }
    }

    pub fn record(&self) -> &Arc<JobRecord> {
        &self.record
    }

    /// Publish one event: write through to the record, then fan out.
    ///
    /// An event the record rejects is never fanned out. What is fanned
    /// out is the applied status, not the raw event, so push subscribers
    /// see the same clamped progress the pull path reports. Sending never
    /// blocks; with no subscribers the event is simply dropped from the
    /// push path (it remains observable via the record).
    pub fn publish(&self, event: ProgressEvent) -> Result<JobStatus, ProtocolError> {
        let status = self.record.apply(&event)?;
        // No receivers is fine.
        let _ = self.tx.send(ProgressEvent::from(&status));
        Ok(status)
    }

    /// Attach a new subscriber.
    ///
    /// The stream yields the current status as a synthetic first event, so
    /// a client attaching mid-job sees the current percentage rather than
    /// silence until the next tick, then forwards published events. It
    /// ends after yielding a terminal event; dropping it unsubscribes.
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        // Subscribe before snapshotting so no event between the two is lost.
        // An event in both the snapshot and the buffer is delivered twice,
        // which the at-least-once contract allows.
        let rx = self.tx.subscribe();
        let snapshot = self.record.snapshot();

        async_stream::stream! {
            let first = ProgressEvent::from(&snapshot);
            let mut last_rank = first.state.rank();
            let mut last_completed = first.completed;
            let terminal = first.state.is_terminal();
            yield first;
            if terminal {
                return;
            }

            let mut rx = rx;
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        // A publish racing the snapshot above can leave an
                        // older event sitting in the buffer. Anything behind
                        // what was already yielded is dropped so the stream
                        // stays non-decreasing.
                        let rank = event.state.rank();
                        if rank < last_rank
                            || (rank == last_rank && event.completed < last_completed)
                        {
                            continue;
                        }
                        last_rank = rank;
                        last_completed = event.completed;
                        let terminal = event.state.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "progress subscriber lagged; skipping ahead");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Number of live push subscribers (snapshot-only streams excluded
    /// once they end).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Id-keyed registry of progress channels.
///
/// The map lock is held only for lookups and registration; publishing and
/// subscribing run against the per-job channel without it.
pub struct ProgressHub {
    channels: RwLock<HashMap<JobId, Arc<ProgressChannel>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Arc<ProgressChannel>>> {
        match self.channels.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("channel map lock poisoned on read");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Arc<ProgressChannel>>> {
        match self.channels.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("channel map lock poisoned on write");
                poisoned.into_inner()
            }
        }
    }

    /// Register a channel, rejecting the registration when another
    /// non-terminal job exists for the same target. The check and the
    /// insert happen under one write lock so two starts cannot race a
    /// claim on the same target.
    pub fn try_register(&self, channel: Arc<ProgressChannel>) -> Result<(), JobId> {
        let mut map = self.write();
        let target = channel.record().target();
        for existing in map.values() {
            let record = existing.record();
            if record.target() == target && !record.is_terminal() {
                return Err(record.id());
            }
        }
        map.insert(channel.record().id(), channel);
        Ok(())
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<ProgressChannel>> {
        self.read().get(&job_id).cloned()
    }

    /// Drop a job's channel (retention eviction). Idempotent.
    pub fn remove(&self, job_id: JobId) -> Option<Arc<ProgressChannel>> {
        self.write().remove(&job_id)
    }

    /// Publish to a job's channel. Publishing to an unknown id is a
    /// logged no-op error, never fatal to the caller.
    pub fn publish(&self, job_id: JobId, event: ProgressEvent) -> Result<JobStatus, ProtocolError> {
        match self.get(job_id) {
            Some(channel) => channel.publish(event),
            None => {
                tracing::warn!(job_id = %job_id, "progress published for unknown job");
                Err(ProtocolError::UnknownJob(job_id))
            }
        }
    }

    /// Current status snapshot, `None` for unknown/evicted jobs.
    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.get(job_id).map(|ch| ch.record().snapshot())
    }

    /// Subscribe to a job's events, `None` for unknown/evicted jobs.
    pub fn subscribe(&self, job_id: JobId) -> Option<impl Stream<Item = ProgressEvent> + Send + 'static> {
        self.get(job_id).map(|ch| ch.subscribe())
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobKind, JobState};
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    fn channel_for(target: &str) -> Arc<ProgressChannel> {
        let record = Arc::new(JobRecord::new(
            Uuid::new_v4(),
            JobKind::BatchPrepare,
            target,
            None,
        ));
        Arc::new(ProgressChannel::new(record))
    }

    #[tokio::test]
    async fn test_subscribe_sees_snapshot_first() {
        let channel = channel_for("t1");
        let id = channel.record().id();
        channel.publish(ProgressEvent::running(id, 4, 10)).unwrap();

        // Attaching mid-job must not be silent until the next tick.
        let mut stream = Box::pin(channel.subscribe());
        let first = stream.next().await.unwrap();
        assert_eq!(first.state, JobState::Running);
        assert_eq!(first.completed, 4);
        assert_eq!(first.total, 10);
    }

    #[tokio::test]
    async fn test_stream_ends_after_terminal() {
        let channel = channel_for("t1");
        let id = channel.record().id();

        let mut stream = Box::pin(channel.subscribe());
        // Consume the pending snapshot.
        assert_eq!(stream.next().await.unwrap().state, JobState::Pending);

        channel.publish(ProgressEvent::running(id, 10, 10)).unwrap();
        channel
            .publish(ProgressEvent::done(id, 10, 10, None))
            .unwrap();

        assert_eq!(stream.next().await.unwrap().state, JobState::Running);
        assert_eq!(stream.next().await.unwrap().state, JobState::Done);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_after_terminal_yields_only_terminal() {
        let channel = channel_for("t1");
        let id = channel.record().id();
        channel.publish(ProgressEvent::running(id, 10, 10)).unwrap();
        channel
            .publish(ProgressEvent::done(id, 10, 10, None))
            .unwrap();

        let events: Vec<_> = channel.subscribe().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, JobState::Done);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_without_subscribers() {
        let channel = channel_for("t1");
        let id = channel.record().id();
        // Far more events than CHANNEL_CAPACITY, no subscribers attached.
        for i in 0..500u64 {
            channel
                .publish(ProgressEvent::running(id, i, 500))
                .unwrap();
        }
        assert_eq!(channel.record().snapshot().completed, 499);
    }

    #[tokio::test]
    async fn test_rejected_event_not_fanned_out() {
        let channel = channel_for("t1");
        let id = channel.record().id();
        channel.publish(ProgressEvent::running(id, 1, 10)).unwrap();

        let mut stream = Box::pin(channel.subscribe());
        assert_eq!(stream.next().await.unwrap().completed, 1);

        // Mid-run total change is rejected and must not reach subscribers.
        assert!(channel.publish(ProgressEvent::running(id, 2, 99)).is_err());
        channel.publish(ProgressEvent::running(id, 2, 10)).unwrap();

        let next = stream.next().await.unwrap();
        assert_eq!(next.total, 10);
        assert_eq!(next.completed, 2);
    }

    #[tokio::test]
    async fn test_push_path_reflects_clamped_progress() {
        let channel = channel_for("t1");
        let id = channel.record().id();

        let mut stream = Box::pin(channel.subscribe());
        assert_eq!(stream.next().await.unwrap().state, JobState::Pending);

        // A publisher reporting backward counts is clamped by the record;
        // the push path must carry the clamped value, not the raw one.
        channel.publish(ProgressEvent::running(id, 7, 10)).unwrap();
        channel.publish(ProgressEvent::running(id, 4, 10)).unwrap();

        assert_eq!(stream.next().await.unwrap().completed, 7);
        assert_eq!(stream.next().await.unwrap().completed, 7);
    }

    #[tokio::test]
    async fn test_subscriber_racing_publisher_never_regresses() {
        // A subscriber attaching mid-publish can see its snapshot land
        // between two buffered events; the stream must still be
        // non-decreasing in completed on the single push path.
        for _ in 0..100 {
            let channel = channel_for("t1");
            let id = channel.record().id();

            let publisher = {
                let channel = Arc::clone(&channel);
                tokio::spawn(async move {
                    for i in 1..=20u64 {
                        let _ = channel.publish(ProgressEvent::running(id, i, 20));
                        tokio::task::yield_now().await;
                    }
                    let _ = channel.publish(ProgressEvent::done(id, 20, 20, None));
                })
            };

            let events: Vec<_> = channel.subscribe().collect().await;
            publisher.await.unwrap();

            for pair in events.windows(2) {
                assert!(
                    pair[0].completed <= pair[1].completed,
                    "completed regressed: {} then {}",
                    pair[0].completed,
                    pair[1].completed
                );
            }
            assert_eq!(events.last().unwrap().state, JobState::Done);
        }
    }

    #[tokio::test]
    async fn test_hub_publish_unknown_job_is_logged_noop() {
        let hub = ProgressHub::new();
        let id = Uuid::new_v4();
        let err = hub
            .publish(id, ProgressEvent::running(id, 1, 2))
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownJob(id));
    }

    #[tokio::test]
    async fn test_hub_rejects_second_job_for_running_target() {
        let hub = ProgressHub::new();
        let first = channel_for("household-set-9");
        let first_id = first.record().id();
        hub.try_register(first).unwrap();

        let second = channel_for("household-set-9");
        assert_eq!(hub.try_register(second), Err(first_id));

        // A different target is unaffected.
        hub.try_register(channel_for("household-set-10")).unwrap();
    }

    #[tokio::test]
    async fn test_hub_allows_restart_after_terminal() {
        let hub = ProgressHub::new();
        let first = channel_for("t1");
        let id = first.record().id();
        hub.try_register(first).unwrap();
        hub.publish(id, ProgressEvent::failed(id, 0, 0, "boom"))
            .unwrap();

        // Terminal jobs hold no claim on their target.
        hub.try_register(channel_for("t1")).unwrap();
    }

    #[tokio::test]
    async fn test_slow_subscriber_skips_ahead_but_sees_terminal() {
        let channel = channel_for("t1");
        let id = channel.record().id();

        let mut stream = Box::pin(channel.subscribe());
        assert_eq!(stream.next().await.unwrap().state, JobState::Pending);

        // Overflow the subscriber's buffer without it draining.
        for i in 0..200u64 {
            channel
                .publish(ProgressEvent::running(id, i, 200))
                .unwrap();
        }
        channel
            .publish(ProgressEvent::done(id, 200, 200, None))
            .unwrap();

        // The subscriber lags, skips ahead, and still observes the
        // terminal event as the last item.
        let rest: Vec<_> = tokio::time::timeout(Duration::from_secs(1), stream.collect::<Vec<_>>())
            .await
            .expect("stream should end");
        let last = rest.last().unwrap();
        assert_eq!(last.state, JobState::Done);
        for pair in rest.windows(2) {
            assert!(pair[0].completed <= pair[1].completed);
        }
    }
}
