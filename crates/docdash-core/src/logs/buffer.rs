//! Bounded, deduplicating log buffer.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::LogEvent;

/// Append-only ring of log lines. Oldest lines are evicted first once
/// `capacity` is reached; a line whose hash is already buffered is dropped.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    dedup_window: Duration,
    entries: VecDeque<LogEvent>,
    seen: HashSet<String>,
}

impl LogBuffer {
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            dedup_window,
            entries: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if the line was appended.
    pub fn push(&mut self, message: impl Into<String>, timestamp: DateTime<Utc>) -> bool {
        let event = LogEvent::new(message, timestamp, self.dedup_window);
        if self.seen.contains(&event.hash) {
            return false;
        }

        while self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.seen.remove(&evicted.hash);
            }
        }

        self.seen.insert(event.hash.clone());
        self.entries.push_back(event);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<LogEvent> {
        self.entries.iter().cloned().collect()
    }
}
