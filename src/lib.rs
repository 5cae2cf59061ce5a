//! Write-buffered page-visit analytics.
//!
//! Request handlers call [`VisitRecorder::record_visit`] for every page
//! view. Visits travel over an unbounded queue to a single flush worker that
//! coalesces them into `(date, page) -> hits` counts and periodically adds
//! those counts to a SQLite table:
//!
//! - after `flush_threshold` hits since the last flush,
//! - after the queue has been idle for `idle_timeout`,
//! - when pending hits grow older than `max_staleness`,
//! - and once more on [`Pipeline::shutdown`].
//!
//! ```no_run
//! use pagehits::{AnalyticsConfig, Pipeline};
//!
//! let pipeline = Pipeline::start(AnalyticsConfig::new("analytics.db"))?;
//! let recorder = pipeline.recorder();
//! recorder.record_visit("/blog/hello-world");
//! pipeline.shutdown()?;
//! # Ok::<(), pagehits::Error>(())
//! ```

pub mod buffer;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod policy;
pub mod stats;
pub mod storage;
pub mod worker;

pub use config::{AnalyticsConfig, FailurePolicy};
pub use error::{Error, Result};
pub use event::{VisitEvent, VisitKey};
pub use pipeline::{Pipeline, VisitRecorder};
pub use stats::StatsSnapshot;
pub use storage::{SqliteStore, VisitStore};
