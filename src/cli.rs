use crate::config::{self, AnalyticsConfig, FailurePolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pagehits")]
#[command(about = "Write-buffered page-visit analytics backed by SQLite")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Analytics database path
    #[arg(long, short = 'd', global = true, env = "PAGEHITS_DB", default_value = config::DEFAULT_STORE_LOCATION)]
    pub db: PathBuf,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed page paths (one per line, optionally prefixed with a YYYY-MM-DD
    /// date) through the buffering pipeline
    Ingest {
        /// Input file (defaults to stdin)
        file: Option<PathBuf>,

        /// Hits since the last flush that trigger a flush
        #[arg(long, short = 't', default_value_t = config::DEFAULT_FLUSH_THRESHOLD)]
        threshold: u64,

        /// Flush pending hits after the queue has been idle this long
        #[arg(long, short = 'i', default_value = "60s", value_parser = config::parse_duration)]
        idle_timeout: Duration,

        /// Flush pending hits at least this often under steady traffic ("off" to disable)
        #[arg(long, default_value = "5m", value_parser = parse_max_staleness)]
        max_staleness: MaxStaleness,

        /// What to do with a batch the database rejects
        #[arg(long, value_enum, default_value_t = FailurePolicy::Requeue)]
        on_failure: FailurePolicy,

        /// Path prefixes that are never counted (repeatable)
        #[arg(long = "ignore", default_values_t = ["/static".to_string()])]
        ignored_prefixes: Vec<String>,
    },

    /// Show the most visited pages for a day
    Top {
        /// Day to report, YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        date: Option<String>,

        /// Number of entries to display
        #[arg(long, short = 'n', default_value = "20")]
        top: usize,

        /// Output as JSON
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Show total hits per day, newest first
    Days {
        /// Number of days to display
        #[arg(long, short = 'n', default_value = "14")]
        limit: usize,
    },

    /// Execute raw SQL query on the analytics database
    Query {
        /// SQL query to execute
        sql: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// `--max-staleness` value; `None` when disabled
#[derive(Debug, Clone, Copy)]
pub struct MaxStaleness(pub Option<Duration>);

fn parse_max_staleness(s: &str) -> Result<MaxStaleness, String> {
    config::parse_staleness(s).map(MaxStaleness)
}

impl Cli {
    /// Pipeline configuration for the `ingest` command
    pub fn analytics_config(&self) -> Option<AnalyticsConfig> {
        match &self.command {
            Command::Ingest {
                threshold,
                idle_timeout,
                max_staleness,
                on_failure,
                ignored_prefixes,
                ..
            } => Some(
                AnalyticsConfig::new(&self.db)
                    .with_flush_threshold(*threshold)
                    .with_idle_timeout(*idle_timeout)
                    .with_max_staleness(max_staleness.0)
                    .with_failure_policy(*on_failure)
                    .with_ignored_prefixes(ignored_prefixes.clone()),
            ),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(config) = self.analytics_config() {
            config.validate().map_err(|e| e.to_string())?;
        }

        if let Command::Top { top: 0, .. } = self.command {
            return Err("--top must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_config() {
        let cli = Cli::try_parse_from([
            "pagehits",
            "--db",
            "visits.db",
            "ingest",
            "--threshold",
            "5",
            "--idle-timeout",
            "2s",
            "--max-staleness",
            "off",
            "--on-failure",
            "drop",
            "--ignore",
            "/assets",
        ])
        .unwrap();

        let config = cli.analytics_config().unwrap();
        assert_eq!(config.store_location, PathBuf::from("visits.db"));
        assert_eq!(config.flush_threshold, 5);
        assert_eq!(config.idle_timeout, Duration::from_secs(2));
        assert_eq!(config.max_staleness, None);
        assert_eq!(config.on_failure, FailurePolicy::Drop);
        assert_eq!(config.ignored_prefixes, vec!["/assets"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_ingest_defaults() {
        let cli = Cli::try_parse_from(["pagehits", "ingest"]).unwrap();
        let config = cli.analytics_config().unwrap();
        assert_eq!(config.flush_threshold, 20);
        assert_eq!(config.max_staleness, Some(Duration::from_secs(300)));
        assert_eq!(config.ignored_prefixes, vec!["/static"]);
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let cli = Cli::try_parse_from(["pagehits", "ingest", "-t", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_report_commands_have_no_pipeline_config() {
        let cli = Cli::try_parse_from(["pagehits", "top", "--date", "2024-01-01"]).unwrap();
        assert!(cli.analytics_config().is_none());
    }
}
