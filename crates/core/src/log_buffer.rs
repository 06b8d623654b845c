//! Bounded, order-preserving store of output lines for one job.
//!
//! Appends past capacity evict the oldest entry and set the truncation
//! flag, which is never cleared afterwards.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Default number of log entries retained per job.
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// Which channel a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    Error,
}

impl LogStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Error => "error",
        }
    }
}

/// A single captured output line. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub stream: LogStream,
    pub message: String,
    pub timestamp: Timestamp,
}

impl LogEntry {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            stream,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// FIFO ring of [`LogEntry`] values with a fixed maximum length.
///
/// Serializes as `{ "logs": [...], "logsTruncated": bool }` so it can be
/// flattened into the job record.
#[derive(Debug, Clone, Serialize)]
pub struct LogBuffer {
    #[serde(rename = "logs")]
    entries: VecDeque<LogEntry>,
    #[serde(rename = "logsTruncated")]
    truncated: bool,
    #[serde(skip)]
    capacity: usize,
}

impl LogBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            truncated: false,
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full.
    ///
    /// Returns `true` if an entry was evicted.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        let mut evicted = false;
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            evicted = true;
        }
        if evicted {
            self.truncated = true;
        }
        self.entries.push_back(entry);
        evicted
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

    /// Whether any entry has ever been evicted.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> LogEntry {
        LogEntry::new(LogStream::Stdout, format!("line {n}"))
    }

    #[test]
    fn keeps_entries_in_order_below_capacity() {
        let mut buf = LogBuffer::new(4);
        for n in 0..3 {
            assert!(!buf.push(line(n)));
        }
        let messages: Vec<_> = buf.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["line 0", "line 1", "line 2"]);
        assert!(!buf.is_truncated());
    }

    #[test]
    fn evicts_oldest_and_keeps_last_entries() {
        let mut buf = LogBuffer::new(2);
        for n in 0..5 {
            buf.push(line(n));
        }
        assert_eq!(buf.len(), 2);
        assert!(buf.is_truncated());
        let messages: Vec<_> = buf.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["line 3", "line 4"]);
    }

    #[test]
    fn truncation_flag_is_permanent() {
        let mut buf = LogBuffer::new(1);
        buf.push(line(0));
        buf.push(line(1));
        assert!(buf.is_truncated());
        // Further appends never clear it.
        buf.push(line(2));
        assert!(buf.is_truncated());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buf = LogBuffer::new(0);
        buf.push(line(0));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn serializes_with_flattenable_field_names() {
        let mut buf = LogBuffer::new(1);
        buf.push(LogEntry::new(LogStream::Stderr, "a"));
        buf.push(LogEntry::new(LogStream::Stderr, "b"));
        let json = serde_json::to_value(&buf).unwrap();
        assert_eq!(json["logsTruncated"], true);
        assert_eq!(json["logs"][0]["stream"], "stderr");
        assert_eq!(json["logs"][0]["message"], "b");
        assert!(json.get("capacity").is_none());
    }
}
