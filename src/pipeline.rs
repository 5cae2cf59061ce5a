use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::event::VisitEvent;
use crate::policy::FlushPolicy;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::storage::{SqliteStore, VisitStore};
use crate::worker::{Command, FlushWorker};
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Producer handle handed to request handlers.
///
/// Cheap to clone and safe to share between threads. Recording a visit is a
/// single unbounded-queue push: it never blocks and never fails visibly.
#[derive(Clone)]
pub struct VisitRecorder {
    tx: Sender<Command>,
    config: Arc<AnalyticsConfig>,
}

impl VisitRecorder {
    /// Record one view of `page_path`, bucketed by today's UTC date
    pub fn record_visit(&self, page_path: &str) {
        if !self.config.should_track(page_path) {
            trace!(page_path, "Ignoring untracked path");
            return;
        }
        self.enqueue(VisitEvent::now(page_path));
    }

    /// Record one view of `page_path` on an explicit date
    pub fn record_visit_on(&self, page_path: &str, date: NaiveDate) {
        if !self.config.should_track(page_path) {
            trace!(page_path, "Ignoring untracked path");
            return;
        }
        self.enqueue(VisitEvent::new(page_path, date));
    }

    fn enqueue(&self, event: VisitEvent) {
        if self.tx.send(Command::Visit(event)).is_err() {
            debug!("Flush worker stopped, visit not recorded");
        }
    }
}

/// Running analytics pipeline: the event queue plus its flush worker.
///
/// Call [`Pipeline::shutdown`] during graceful termination so the final
/// flush runs and its outcome is visible. Dropping the pipeline performs the
/// same flush but can only log a failure.
pub struct Pipeline {
    recorder: VisitRecorder,
    stats: Arc<PipelineStats>,
    worker: Option<JoinHandle<Result<StatsSnapshot>>>,
}

impl Pipeline {
    /// Open the SQLite store named by the config and start the worker
    pub fn start(config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.store_location)?;
        Self::spawn(config, store)
    }

    /// Start the worker over any store implementation
    pub fn with_store<S>(config: AnalyticsConfig, store: S) -> Result<Self>
    where
        S: VisitStore + 'static,
    {
        config.validate()?;
        Self::spawn(config, store)
    }

    fn spawn<S>(config: AnalyticsConfig, store: S) -> Result<Self>
    where
        S: VisitStore + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(PipelineStats::default());
        let worker = FlushWorker::new(
            rx,
            store,
            FlushPolicy::from_config(&config),
            config.on_failure,
            stats.clone(),
        );

        let handle = thread::Builder::new()
            .name("pagehits-flush".into())
            .spawn(move || worker.run())
            .map_err(Error::WorkerSpawn)?;

        info!(
            store = %config.store_location.display(),
            threshold = config.flush_threshold,
            idle_timeout = ?config.idle_timeout,
            "Analytics pipeline started"
        );

        Ok(Self {
            recorder: VisitRecorder {
                tx,
                config: Arc::new(config),
            },
            stats,
            worker: Some(handle),
        })
    }

    /// A handle producers can keep
    pub fn recorder(&self) -> VisitRecorder {
        self.recorder.clone()
    }

    pub fn record_visit(&self, page_path: &str) {
        self.recorder.record_visit(page_path);
    }

    pub fn record_visit_on(&self, page_path: &str, date: NaiveDate) {
        self.recorder.record_visit_on(page_path, date);
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.recorder.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Block until the worker has absorbed every visit queued before this
    /// call. Does not flush.
    pub fn sync(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.recorder
            .tx
            .send(Command::Sync(ack_tx))
            .map_err(|_| Error::WorkerStopped)?;
        ack_rx.recv().map_err(|_| Error::WorkerStopped)
    }

    /// Flush everything absorbed so far and return the hits written
    pub fn flush(&self) -> Result<u64> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.recorder
            .tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| Error::WorkerStopped)?;
        reply_rx.recv().map_err(|_| Error::WorkerStopped)?
    }

    /// Stop accepting work, run the final flush and wait for the worker
    pub fn shutdown(mut self) -> Result<StatsSnapshot> {
        self.stop()
    }

    fn stop(&mut self) -> Result<StatsSnapshot> {
        let Some(handle) = self.worker.take() else {
            return Ok(self.stats.snapshot());
        };

        // The worker may already be gone if every sender was dropped
        let _ = self.recorder.tx.send(Command::Shutdown);
        handle.join().map_err(|_| Error::WorkerPanicked)?
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.worker.is_some()
            && let Err(e) = self.stop()
        {
            error!(error = %e, "Analytics pipeline did not shut down cleanly");
        }
    }
}
