//! Fixed-capacity ring buffer of Editor log records

use crate::types::{LogLevel, LogRecord};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

/// Filter applied by [`LogBuffer::filter`]
///
/// Every predicate that is set must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQuery {
    /// Accepted levels (all levels when unset)
    pub levels: Option<HashSet<LogLevel>>,
    /// Case-sensitive substring of the message
    pub message_contains: Option<String>,
    /// Case-sensitive substring of the stack trace
    pub stack_trace_contains: Option<String>,
    /// Inclusive lower timestamp bound
    pub after: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound
    pub before: Option<DateTime<Utc>>,
}

impl LogQuery {
    /// Does `record` satisfy every predicate?
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(levels) = &self.levels {
            if !levels.contains(&record.level) {
                return false;
            }
        }
        if let Some(needle) = &self.message_contains {
            if !record.message.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.stack_trace_contains {
            if !record.stack_trace.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.after {
            if record.timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if record.timestamp > before {
                return false;
            }
        }
        true
    }
}

/// Bounded FIFO of log records
///
/// Each record is tagged with a sequence number that keeps increasing across
/// evictions, so a [`watermark`](LogBuffer::watermark) taken before a command
/// still isolates that command's logs once the buffer is full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: VecDeque<(u64, LogRecord)>,
    capacity: usize,
    next_seq: u64,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn append(&mut self, record: LogRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back((self.next_seq, record));
        self.next_seq += 1;
    }

    /// The most recent `limit` matching records, oldest first
    pub fn filter(&self, query: &LogQuery, limit: usize) -> Vec<LogRecord> {
        let mut matched: Vec<LogRecord> = self
            .records
            .iter()
            .rev()
            .map(|(_, record)| record)
            .filter(|record| query.matches(record))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Owned copy of every buffered record, oldest first
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.iter().map(|(_, record)| record.clone()).collect()
    }

    /// Sequence number the next appended record will receive
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Buffered records appended at or after `watermark`
    pub fn since(&self, watermark: u64) -> Vec<LogRecord> {
        // Sequence numbers are contiguous, so the start index is computable.
        let first = match self.records.front() {
            Some((seq, _)) => *seq,
            None => return Vec::new(),
        };
        let skip = watermark.saturating_sub(first) as usize;
        self.records
            .iter()
            .skip(skip)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
