use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FLUSH_THRESHOLD: u64 = 20;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(300);
pub const DEFAULT_STORE_LOCATION: &str = "analytics.db";

/// What the worker does with a snapshot the store refused
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Merge the snapshot back into the buffer and retry on the next cycle
    #[default]
    Requeue,
    /// Log the failure and discard the snapshot
    Drop,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requeue" => Ok(FailurePolicy::Requeue),
            "drop" => Ok(FailurePolicy::Drop),
            other => Err(format!("unknown failure policy '{other}' (expected requeue or drop)")),
        }
    }
}

/// Pipeline configuration, fixed for the lifetime of a pipeline
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// SQLite database file holding the `pagevisits` table
    pub store_location: PathBuf,
    /// Hits since the last flush that force a flush
    pub flush_threshold: u64,
    /// How long the worker waits on an empty queue before flushing
    pub idle_timeout: Duration,
    /// Upper bound on how long a pending hit may sit unflushed under
    /// sustained traffic. `None` disables the check.
    pub max_staleness: Option<Duration>,
    pub on_failure: FailurePolicy,
    /// Paths with any of these prefixes are never tracked
    pub ignored_prefixes: Vec<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_LOCATION)
    }
}

impl AnalyticsConfig {
    pub fn new(store_location: impl Into<PathBuf>) -> Self {
        Self {
            store_location: store_location.into(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_staleness: Some(DEFAULT_MAX_STALENESS),
            on_failure: FailurePolicy::default(),
            ignored_prefixes: vec!["/static".to_string()],
        }
    }

    pub fn with_flush_threshold(mut self, threshold: u64) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_staleness(mut self, staleness: Option<Duration>) -> Self {
        self.max_staleness = staleness;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_ignored_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Load from `PAGEHITS_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, secrets file, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup("PAGEHITS_DB").unwrap_or_else(|| DEFAULT_STORE_LOCATION.to_string()),
        );

        if let Some(value) = lookup("PAGEHITS_FLUSH_THRESHOLD") {
            config.flush_threshold = value.trim().parse().map_err(|e| {
                Error::InvalidConfig(format!("PAGEHITS_FLUSH_THRESHOLD='{value}': {e}"))
            })?;
        }
        if let Some(value) = lookup("PAGEHITS_IDLE_TIMEOUT") {
            config.idle_timeout = parse_duration(&value).map_err(|e| {
                Error::InvalidConfig(format!("PAGEHITS_IDLE_TIMEOUT: {e}"))
            })?;
        }
        if let Some(value) = lookup("PAGEHITS_MAX_STALENESS") {
            config.max_staleness = parse_staleness(&value).map_err(|e| {
                Error::InvalidConfig(format!("PAGEHITS_MAX_STALENESS: {e}"))
            })?;
        }
        if let Some(value) = lookup("PAGEHITS_ON_FAILURE") {
            config.on_failure = value
                .parse()
                .map_err(|e| Error::InvalidConfig(format!("PAGEHITS_ON_FAILURE: {e}")))?;
        }
        if let Some(value) = lookup("PAGEHITS_IGNORED_PREFIXES") {
            config.ignored_prefixes = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(Error::InvalidConfig(
                "flush threshold must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_staleness.is_some_and(|s| s.is_zero()) {
            return Err(Error::InvalidConfig(
                "max staleness must be greater than zero (omit it to disable)".to_string(),
            ));
        }
        if self.store_location.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "store location must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a request path should be counted at all
    pub fn should_track(&self, page_path: &str) -> bool {
        !page_path.is_empty()
            && !self
                .ignored_prefixes
                .iter()
                .any(|prefix| page_path.starts_with(prefix.as_str()))
    }
}

/// Parse a duration such as `30s`, `5m`, `1h30m`, or a bare number of seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 30s, 5m, 2h, 1h30m, 90",
        s
    ))
}

/// Like [`parse_duration`], but `off`/`none` disable the staleness check
pub fn parse_staleness(s: &str) -> std::result::Result<Option<Duration>, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "disabled" => Ok(None),
        _ => parse_duration(s).map(Some),
    }
}
