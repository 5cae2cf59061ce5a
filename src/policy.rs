use crate::buffer::AggregationBuffer;
use crate::config::AnalyticsConfig;
use std::fmt;
use std::time::{Duration, Instant};

/// Why a flush happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Threshold,
    Idle,
    Staleness,
    Requested,
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Threshold => "threshold",
            FlushTrigger::Idle => "idle",
            FlushTrigger::Staleness => "staleness",
            FlushTrigger::Requested => "requested",
            FlushTrigger::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Decides when the buffer is drained to the store
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub threshold: u64,
    pub idle_timeout: Duration,
    pub max_staleness: Option<Duration>,
}

impl FlushPolicy {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            threshold: config.flush_threshold,
            idle_timeout: config.idle_timeout,
            max_staleness: config.max_staleness,
        }
    }

    /// Evaluated right after an event was merged into the buffer
    pub fn after_event(&self, buffer: &AggregationBuffer, now: Instant) -> Option<FlushTrigger> {
        if buffer.hits_since_flush() >= self.threshold {
            return Some(FlushTrigger::Threshold);
        }
        if let (Some(limit), Some(since)) = (self.max_staleness, buffer.pending_since())
            && now.saturating_duration_since(since) >= limit
        {
            return Some(FlushTrigger::Staleness);
        }
        None
    }

    /// Evaluated when the queue stayed empty for a whole `idle_timeout`
    pub fn on_idle(&self, buffer: &AggregationBuffer) -> Option<FlushTrigger> {
        (!buffer.is_empty()).then_some(FlushTrigger::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VisitEvent;
    use chrono::NaiveDate;

    fn policy(threshold: u64, max_staleness: Option<Duration>) -> FlushPolicy {
        FlushPolicy {
            threshold,
            idle_timeout: Duration::from_secs(60),
            max_staleness,
        }
    }

    fn visit() -> VisitEvent {
        VisitEvent::new("/", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn test_threshold_trigger() {
        let policy = policy(3, None);
        let mut buffer = AggregationBuffer::new();
        let now = Instant::now();

        buffer.add(visit());
        buffer.add(visit());
        assert_eq!(policy.after_event(&buffer, now), None);

        buffer.add(visit());
        assert_eq!(policy.after_event(&buffer, now), Some(FlushTrigger::Threshold));
    }

    #[test]
    fn test_idle_trigger_requires_pending_hits() {
        let policy = policy(20, None);
        let mut buffer = AggregationBuffer::new();
        assert_eq!(policy.on_idle(&buffer), None);

        buffer.add(visit());
        assert_eq!(policy.on_idle(&buffer), Some(FlushTrigger::Idle));
    }

    #[test]
    fn test_staleness_trigger() {
        let policy = policy(20, Some(Duration::from_secs(30)));
        let mut buffer = AggregationBuffer::new();
        buffer.add(visit());
        let since = buffer.pending_since().unwrap();

        assert_eq!(policy.after_event(&buffer, since + Duration::from_secs(29)), None);
        assert_eq!(
            policy.after_event(&buffer, since + Duration::from_secs(30)),
            Some(FlushTrigger::Staleness)
        );
    }

    #[test]
    fn test_staleness_disabled() {
        let policy = policy(20, None);
        let mut buffer = AggregationBuffer::new();
        buffer.add(visit());
        let since = buffer.pending_since().unwrap();
        assert_eq!(policy.after_event(&buffer, since + Duration::from_secs(3600)), None);
    }
}
