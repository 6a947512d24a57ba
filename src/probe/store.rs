//! Latest-known metrics for every stream, shared between the stream runners
//! and the reporter.

use crate::probe::stream::StreamId;
use crate::protocol::IntervalReport;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// State of one stream as seen by readers of the store
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatus {
    pub id: StreamId,
    /// Most recent interval report, `None` until the first one arrives
    pub latest: Option<IntervalReport>,
    /// Set once the stream's session has ended; never cleared
    pub done: bool,
    /// Why the session could not be started, if it could not
    pub failure: Option<String>,
}

impl StreamStatus {
    fn empty(id: StreamId) -> Self {
        Self {
            id,
            latest: None,
            done: false,
            failure: None,
        }
    }
}

/// Point-in-time copy of every stream's status, in [`StreamId::ALL`] order
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub streams: [StreamStatus; 4],
}

impl Snapshot {
    /// True once every stream has signaled completion
    pub fn all_done(&self) -> bool {
        self.streams.iter().all(|s| s.done)
    }

    pub fn get(&self, id: StreamId) -> &StreamStatus {
        &self.streams[id.index()]
    }
}

/// Fixed arena of per-stream slots, each behind its own lock.
///
/// Each slot has a single writer (the stream's runner); readers copy one slot
/// at a time, so a snapshot is consistent per stream but not across streams.
pub struct ResultStore {
    slots: [Mutex<StreamStatus>; 4],
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            slots: StreamId::ALL.map(|id| Mutex::new(StreamStatus::empty(id))),
        }
    }

    fn slot(&self, id: StreamId) -> MutexGuard<'_, StreamStatus> {
        // A panicking writer cannot leave a slot half-written: every mutation
        // below is a single field assignment.
        self.slots[id.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the latest metrics for `id`
    pub fn update(&self, id: StreamId, report: IntervalReport) {
        debug!(stream = %id, interval = %report.interval, "Storing interval report");
        self.slot(id).latest = Some(report);
    }

    /// Mark `id` as finished, whether or not it ever produced data
    pub fn mark_done(&self, id: StreamId) {
        debug!(stream = %id, "Stream marked done");
        self.slot(id).done = true;
    }

    /// Mark `id` as finished because its session could not be started
    pub fn mark_failed(&self, id: StreamId, reason: impl Into<String>) {
        let mut slot = self.slot(id);
        slot.failure = Some(reason.into());
        slot.done = true;
    }

    /// Copy of a single stream's status
    pub fn status(&self, id: StreamId) -> StreamStatus {
        self.slot(id).clone()
    }

    /// Copy every stream's status, locking one slot at a time
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            streams: StreamId::ALL.map(|id| self.status(id)),
        }
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report(interval: &str, lost: u64, total: u64) -> IntervalReport {
        IntervalReport {
            interval: interval.to_string(),
            bandwidth: "64.0 Kbits/sec".to_string(),
            jitter_ms: 0.089,
            lost,
            total,
            loss_percent: 0,
        }
    }

    #[test]
    fn test_new_store_has_no_data() {
        let store = ResultStore::new();
        let snapshot = store.snapshot();
        for (status, id) in snapshot.streams.iter().zip(StreamId::ALL) {
            assert_eq!(status.id, id);
            assert!(status.latest.is_none());
            assert!(!status.done);
        }
        assert!(!snapshot.all_done());
    }

    #[test]
    fn test_last_write_wins() {
        let store = ResultStore::new();
        store.update(StreamId::BgForward, report("0.00-10.00", 0, 100));
        store.update(StreamId::BgForward, report("10.00-20.00", 2, 200));

        let status = store.status(StreamId::BgForward);
        assert_eq!(status.latest, Some(report("10.00-20.00", 2, 200)));
        assert!(store.status(StreamId::BgReverse).latest.is_none());
    }

    #[test]
    fn test_done_is_terminal_without_data() {
        let store = ResultStore::new();
        store.mark_done(StreamId::VoiceReverse);

        for _ in 0..3 {
            let status = store.snapshot().get(StreamId::VoiceReverse).clone();
            assert!(status.done);
            assert!(status.latest.is_none());
        }
    }

    #[test]
    fn test_update_after_done_keeps_done() {
        let store = ResultStore::new();
        store.update(StreamId::VoiceForward, report("0.00-10.00", 0, 500));
        store.mark_done(StreamId::VoiceForward);
        store.update(StreamId::VoiceForward, report("0.00-60.00", 0, 3000));

        let status = store.status(StreamId::VoiceForward);
        assert!(status.done);
        assert_eq!(status.latest, Some(report("0.00-60.00", 0, 3000)));
    }

    #[test]
    fn test_mark_failed_sets_done() {
        let store = ResultStore::new();
        store.mark_failed(StreamId::BgReverse, "No such file or directory");

        let status = store.status(StreamId::BgReverse);
        assert!(status.done);
        assert_eq!(status.failure.as_deref(), Some("No such file or directory"));
    }

    #[test]
    fn test_all_done_requires_every_stream() {
        let store = ResultStore::new();
        for id in &StreamId::ALL[..3] {
            store.mark_done(*id);
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.streams.iter().filter(|s| s.done).count(), 3);
        assert!(!snapshot.all_done());

        store.mark_done(StreamId::BgReverse);
        assert!(store.snapshot().all_done());
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(ResultStore::new());
        let updates = 1_000u64;

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    // Totals only ever grow, so no snapshot may go backwards
                    let mut seen = [0u64; 4];
                    for _ in 0..updates {
                        let snapshot = store.snapshot();
                        for status in &snapshot.streams {
                            if let Some(latest) = &status.latest {
                                let i = status.id.index();
                                assert!(latest.total >= seen[i]);
                                seen[i] = latest.total;
                            }
                        }
                    }
                })
            })
            .collect();

        let writers: Vec<_> = StreamId::ALL
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for total in 1..=updates {
                        store.update(id, report("0.00-10.00", 0, total));
                    }
                    store.mark_done(id);
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert!(snapshot.all_done());
        for status in &snapshot.streams {
            assert_eq!(status.latest.as_ref().map(|r| r.total), Some(updates));
        }
    }
}
