//! The single flush worker.
//!
//! The worker owns the aggregation buffer outright; producers only ever
//! reach it through the command queue, so the buffer needs no lock and a
//! shutdown can never overlap a flush.

use crate::buffer::AggregationBuffer;
use crate::config::FailurePolicy;
use crate::error::{Error, Result};
use crate::event::VisitEvent;
use crate::policy::{FlushPolicy, FlushTrigger};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::storage::VisitStore;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Messages carried by the event queue
pub(crate) enum Command {
    Visit(VisitEvent),
    /// Acknowledge once everything queued before it has been absorbed
    Sync(Sender<()>),
    /// Flush now and report how many hits were written
    Flush(Sender<Result<u64>>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    WaitingForEvent,
    Accumulating(VisitEvent),
    Flushing(FlushTrigger),
    Shutdown,
}

pub(crate) struct FlushWorker<S> {
    rx: Receiver<Command>,
    store: S,
    policy: FlushPolicy,
    on_failure: FailurePolicy,
    buffer: AggregationBuffer,
    stats: Arc<PipelineStats>,
}

impl<S: VisitStore> FlushWorker<S> {
    pub(crate) fn new(
        rx: Receiver<Command>,
        store: S,
        policy: FlushPolicy,
        on_failure: FailurePolicy,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            rx,
            store,
            policy,
            on_failure,
            buffer: AggregationBuffer::new(),
            stats,
        }
    }

    /// Run until shutdown is requested or every sender is gone
    pub(crate) fn run(mut self) -> Result<StatsSnapshot> {
        debug!(
            threshold = self.policy.threshold,
            idle_timeout = ?self.policy.idle_timeout,
            max_staleness = ?self.policy.max_staleness,
            "Flush worker started"
        );

        let mut state = WorkerState::WaitingForEvent;
        loop {
            state = match state {
                WorkerState::WaitingForEvent => self.wait(),
                WorkerState::Accumulating(event) => {
                    self.absorb(event);
                    match self.policy.after_event(&self.buffer, Instant::now()) {
                        Some(trigger) => WorkerState::Flushing(trigger),
                        None => WorkerState::WaitingForEvent,
                    }
                }
                WorkerState::Flushing(trigger) => {
                    // Failures are logged and handled inside flush()
                    let _ = self.flush(trigger);
                    WorkerState::WaitingForEvent
                }
                WorkerState::Shutdown => return self.finish(),
            };
        }
    }

    fn wait(&mut self) -> WorkerState {
        match self.rx.recv_timeout(self.policy.idle_timeout) {
            Ok(Command::Visit(event)) => WorkerState::Accumulating(event),
            Ok(Command::Sync(ack)) => {
                let _ = ack.send(());
                WorkerState::WaitingForEvent
            }
            Ok(Command::Flush(reply)) => {
                let _ = reply.send(self.flush(FlushTrigger::Requested));
                WorkerState::WaitingForEvent
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => WorkerState::Shutdown,
            Err(RecvTimeoutError::Timeout) => match self.policy.on_idle(&self.buffer) {
                Some(trigger) => WorkerState::Flushing(trigger),
                None => {
                    trace!("Queue idle, nothing pending");
                    WorkerState::WaitingForEvent
                }
            },
        }
    }

    fn absorb(&mut self, event: VisitEvent) {
        self.stats.record_event();
        self.buffer.add(event);
    }

    /// Swap the buffer out and write it. The live buffer and hit counter are
    /// reset before any I/O happens.
    fn flush(&mut self, trigger: FlushTrigger) -> Result<u64> {
        let snapshot = self.buffer.take();
        if snapshot.is_empty() {
            return Ok(0);
        }

        let hits = snapshot.total_hits();
        let keys = snapshot.len();
        let start = Instant::now();

        match self.store.apply(&snapshot) {
            Ok(()) => {
                self.stats.record_flush(hits);
                debug!(
                    %trigger,
                    hits,
                    keys,
                    elapsed = ?start.elapsed(),
                    "Flushed page visits"
                );
                Ok(hits)
            }
            Err(e) => {
                match self.on_failure {
                    FailurePolicy::Requeue => {
                        self.stats.record_failure(0);
                        self.buffer.restore(snapshot);
                        error!(%trigger, hits, keys, error = %e, "Flush failed, requeued for retry");
                    }
                    FailurePolicy::Drop => {
                        self.stats.record_failure(hits);
                        error!(%trigger, hits, keys, error = %e, "Flush failed, visits dropped");
                    }
                }
                Err(e)
            }
        }
    }

    /// Flush unconditionally once. Everything queued ahead of the shutdown
    /// request has already been absorbed; anything sent after it is left in
    /// the queue and dropped with the receiver.
    fn finish(&mut self) -> Result<StatsSnapshot> {
        let pending = self.buffer.pending_hits();
        if let Err(e) = self.flush(FlushTrigger::Shutdown) {
            let lost_hits = match self.on_failure {
                FailurePolicy::Requeue => {
                    let lost = self.buffer.pending_hits();
                    self.stats.record_lost(lost);
                    lost
                }
                // flush() already counted the dropped snapshot
                FailurePolicy::Drop => pending,
            };
            warn!(lost_hits, "Shutting down with unrecorded visits");
            return Err(Error::FlushFailed {
                lost_hits,
                source: Box::new(e),
            });
        }

        let stats = self.stats.snapshot();
        info!(
            events = stats.events_received,
            flushes = stats.flushes,
            hits = stats.hits_flushed,
            "Flush worker stopped"
        );
        Ok(stats)
    }
}
