use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the flush worker, readable from any thread
#[derive(Debug, Default)]
pub struct PipelineStats {
    events_received: AtomicU64,
    flushes: AtomicU64,
    hits_flushed: AtomicU64,
    failed_flushes: AtomicU64,
    hits_dropped: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, hits: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.hits_flushed.fetch_add(hits, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, dropped_hits: u64) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.hits_dropped.fetch_add(dropped_hits, Ordering::Relaxed);
    }

    /// Hits still pending when the worker exits without writing them
    pub(crate) fn record_lost(&self, hits: u64) {
        self.hits_dropped.fetch_add(hits, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            hits_flushed: self.hits_flushed.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            hits_dropped: self.hits_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Visits the worker pulled off the queue
    pub events_received: u64,
    /// Successful store writes
    pub flushes: u64,
    pub hits_flushed: u64,
    pub failed_flushes: u64,
    /// Hits discarded after a failed flush, or left unwritten at shutdown
    pub hits_dropped: u64,
}
