use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::event::parse_date;
use crate::pipeline::{Pipeline, VisitRecorder};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use tracing::{error, info};

enum Stop {
    InputDone(io::Result<u64>),
    Interrupted,
}

/// Run the ingest command - replay page paths through the pipeline until
/// the input ends or a termination signal arrives, then flush and exit
pub fn run(config: AnalyticsConfig, file: Option<&Path>) -> Result<()> {
    let reader: Box<dyn BufRead + Send> = match file {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let pipeline = Pipeline::start(config)?;

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Stop::Interrupted);
    })
    .map_err(|e| Error::Io(io::Error::other(format!("Failed to set Ctrl-C handler: {e}"))))?;

    // Reading stdin blocks, so it gets its own thread and the main thread
    // stays free to react to signals
    let recorder = pipeline.recorder();
    thread::Builder::new()
        .name("pagehits-ingest".into())
        .spawn(move || {
            let _ = tx.send(Stop::InputDone(feed(reader, &recorder)));
        })?;

    let input_result = match rx.recv() {
        Ok(Stop::InputDone(Ok(lines))) => {
            info!(lines, "Input exhausted, flushing pending visits");
            Ok(())
        }
        Ok(Stop::InputDone(Err(e))) => {
            error!(error = %e, "Failed reading input, flushing what was read");
            Err(Error::Io(e))
        }
        Ok(Stop::Interrupted) | Err(_) => {
            info!("Received shutdown signal, flushing pending visits");
            Ok(())
        }
    };

    let stats = pipeline.shutdown()?;
    eprintln!(
        "Recorded {} visits in {} flushes ({} hits written)",
        stats.events_received, stats.flushes, stats.hits_flushed
    );
    if stats.failed_flushes > 0 {
        eprintln!(
            "{} flushes failed, {} hits dropped",
            stats.failed_flushes, stats.hits_dropped
        );
    }

    input_result
}

/// Push every line of `reader` into the queue, returning the lines read
fn feed(reader: impl BufRead, recorder: &VisitRecorder) -> io::Result<u64> {
    let mut lines = 0u64;
    for line in reader.lines() {
        let line = line?;
        lines += 1;
        match parse_line(&line) {
            Some((Some(date), path)) => recorder.record_visit_on(path, date),
            Some((None, path)) => recorder.record_visit(path),
            None => {}
        }
    }
    Ok(lines)
}

/// Split `[YYYY-MM-DD] <path>`. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Option<(Option<NaiveDate>, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some((first, rest)) = line.split_once(char::is_whitespace)
        && let Ok(date) = parse_date(first)
    {
        let path = rest.trim();
        return (!path.is_empty()).then_some((Some(date), path));
    }

    Some((None, line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VisitKey;
    use crate::storage::SqliteStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_parse_line() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(parse_line("/blog"), Some((None, "/blog")));
        assert_eq!(parse_line("  /blog  "), Some((None, "/blog")));
        assert_eq!(parse_line("2024-07-04 /about"), Some((Some(date), "/about")));
        assert_eq!(parse_line("2024-07-04\t/about"), Some((Some(date), "/about")));
        assert_eq!(parse_line("2024-07-04"), Some((None, "2024-07-04")));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("# comment"), None);
    }

    #[test]
    fn test_feed_records_into_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.db");
        let pipeline = Pipeline::start(AnalyticsConfig::new(&path)).unwrap();

        let input = "2024-07-04 /\n2024-07-04 /\n2024-07-04 /static/app.js\n\n2024-07-05 /blog\n";
        let lines = feed(Cursor::new(input), &pipeline.recorder()).unwrap();
        assert_eq!(lines, 5);

        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.events_received, 3);

        let store = SqliteStore::open(&path).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(store.hits(&VisitKey::new(day, "/")).unwrap(), 2);
        assert_eq!(store.hits(&VisitKey::new(day, "/static/app.js")).unwrap(), 0);
        assert_eq!(store.total_hits().unwrap(), 3);
    }
}
