//! In-memory write-coalescing buffer in front of the durable store.
//!
//! Owned by the flush worker only, so nothing here is synchronized.

use crate::event::{VisitEvent, VisitKey};
use std::collections::HashMap;
use std::collections::hash_map;
use std::time::Instant;

/// Pending hits accumulated since the last flush
#[derive(Debug, Default)]
pub struct AggregationBuffer {
    /// Pending hits: (date, page) -> count
    pending: HashMap<VisitKey, u64>,
    /// Hits ingested since the last flush (drives the threshold trigger)
    hits_since_flush: u64,
    /// When the oldest pending hit entered the buffer
    pending_since: Option<Instant>,
}

impl AggregationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one visit into the buffer, returning the hits since last flush
    pub fn add(&mut self, event: VisitEvent) -> u64 {
        *self.pending.entry(event.into_key()).or_insert(0) += 1;
        self.hits_since_flush += 1;
        self.pending_since.get_or_insert_with(Instant::now);
        self.hits_since_flush
    }

    /// Swap out the current contents, leaving an empty buffer and a zeroed
    /// hit counter behind
    pub fn take(&mut self) -> Snapshot {
        self.hits_since_flush = 0;
        self.pending_since = None;
        Snapshot {
            entries: std::mem::take(&mut self.pending),
        }
    }

    /// Merge an unflushed snapshot back in for retry on a later cycle.
    /// Restored hits do not count toward the threshold again.
    pub fn restore(&mut self, snapshot: Snapshot) {
        if snapshot.is_empty() {
            return;
        }
        for (key, hits) in snapshot.entries {
            *self.pending.entry(key).or_insert(0) += hits;
        }
        self.pending_since.get_or_insert_with(Instant::now);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of distinct (date, page) keys pending
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn hits_since_flush(&self) -> u64 {
        self.hits_since_flush
    }

    /// Total hits waiting to be written, including restored ones
    pub fn pending_hits(&self) -> u64 {
        self.pending.values().sum()
    }

    pub fn pending_since(&self) -> Option<Instant> {
        self.pending_since
    }

    #[cfg(test)]
    pub fn get(&self, key: &VisitKey) -> u64 {
        self.pending.get(key).copied().unwrap_or(0)
    }
}

/// Contents of the buffer taken at flush time
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    entries: HashMap<VisitKey, u64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_hits(&self) -> u64 {
        self.entries.values().sum()
    }

    pub fn get(&self, key: &VisitKey) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, VisitKey, u64> {
        self.entries.iter()
    }
}

impl FromIterator<(VisitKey, u64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (VisitKey, u64)>>(iter: I) -> Self {
        let mut entries = HashMap::new();
        for (key, hits) in iter {
            *entries.entry(key).or_insert(0) += hits;
        }
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a VisitKey, &'a u64);
    type IntoIter = hash_map::Iter<'a, VisitKey, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_add_coalesces_by_key() {
        let mut buffer = AggregationBuffer::new();
        assert!(buffer.pending_since().is_none());

        buffer.add(VisitEvent::new("/", day(1)));
        buffer.add(VisitEvent::new("/", day(1)));
        buffer.add(VisitEvent::new("/blog", day(1)));
        let hits = buffer.add(VisitEvent::new("/", day(2)));

        assert_eq!(hits, 4);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(&VisitKey::new(day(1), "/")), 2);
        assert_eq!(buffer.get(&VisitKey::new(day(2), "/")), 1);
        assert!(buffer.pending_since().is_some());
    }

    #[test]
    fn test_take_resets_buffer() {
        let mut buffer = AggregationBuffer::new();
        for _ in 0..5 {
            buffer.add(VisitEvent::new("/contact", day(3)));
        }

        let snapshot = buffer.take();
        assert_eq!(snapshot.total_hits(), 5);
        assert_eq!(snapshot.get(&VisitKey::new(day(3), "/contact")), 5);

        assert!(buffer.is_empty());
        assert_eq!(buffer.hits_since_flush(), 0);
        assert!(buffer.pending_since().is_none());
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_restore_merges_without_counting_toward_threshold() {
        let mut buffer = AggregationBuffer::new();
        buffer.add(VisitEvent::new("/", day(1)));
        buffer.add(VisitEvent::new("/", day(1)));
        let failed = buffer.take();

        buffer.add(VisitEvent::new("/", day(1)));
        buffer.restore(failed);

        assert_eq!(buffer.get(&VisitKey::new(day(1), "/")), 3);
        assert_eq!(buffer.pending_hits(), 3);
        assert_eq!(buffer.hits_since_flush(), 1);
    }

    #[test]
    fn test_snapshot_from_iter_sums_duplicates() {
        let snapshot: Snapshot = [
            (VisitKey::new(day(1), "/a"), 2),
            (VisitKey::new(day(1), "/a"), 3),
            (VisitKey::new(day(1), "/b"), 1),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&VisitKey::new(day(1), "/a")), 5);
        assert_eq!(snapshot.total_hits(), 6);
    }
}
