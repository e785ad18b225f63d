// chat.rs
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::models::{Author, LogEntry};

pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded window of the most recent chat messages. Entries are created
/// once, never mutated, and only age out from the head.
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_seq: u64,
    last_timestamp: DateTime<Utc>,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            last_timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Rebuild from a persisted window, keeping seq and timestamp
    /// continuity so a restart never reuses a sequence number.
    pub fn hydrate(capacity: usize, entries: Vec<LogEntry>) -> Self {
        let mut log = Self::new(capacity);
        for entry in entries {
            log.next_seq = log.next_seq.max(entry.seq + 1);
            log.last_timestamp = log.last_timestamp.max(entry.timestamp);
            log.entries.push_back(entry);
            if log.entries.len() > log.capacity {
                log.entries.pop_front();
            }
        }
        log
    }

    /// Assign the next sequence number and an acceptance timestamp, then
    /// append. Timestamps never run backwards in publish order, even when
    /// the wall clock does.
    pub fn append(
        &mut self,
        author: Author,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<LogEntry, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidInput(
                "message text must not be empty".into(),
            ));
        }
        if author.id.is_blank() {
            return Err(SyncError::InvalidInput(
                "message author must not be empty".into(),
            ));
        }
        let timestamp = now.max(self.last_timestamp);
        let entry = LogEntry {
            seq: self.next_seq,
            author,
            text: text.to_string(),
            timestamp,
        };
        self.next_seq += 1;
        self.last_timestamp = timestamp;
        self.entries.push_back(entry.clone());
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        Ok(entry)
    }

    /// Ordered view, oldest to newest. Used to seed new subscribers.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
