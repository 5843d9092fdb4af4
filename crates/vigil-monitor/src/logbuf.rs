//! Capped in-memory operator log.

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Default log capacity; the oldest entry is evicted past this.
pub const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: u64,
    pub at: DateTime<Local>,
    pub message: String,
    pub severity: Severity,
    /// Optional diagnostic text (e.g. a baseline assessment).
    pub detail: Option<String>,
}

/// Append-only log with a fixed capacity. Not persisted.
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Append an entry, evicting the oldest when full. Returns the entry.
    pub fn push(&mut self, message: String, severity: Severity, detail: Option<String>) -> &LogEntry {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let entry = LogEntry {
            id: self.next_id,
            at: Local::now(),
            message,
            severity,
            detail,
        };
        self.next_id += 1;
        self.entries.push_back(entry);
        self.entries.back().expect("just pushed")
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_monotonic_ids() {
        let mut log = LogBuffer::new(10);
        let a = log.push("a".into(), Severity::Info, None).id;
        let b = log.push("b".into(), Severity::Warning, None).id;
        assert!(b > a);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut log = LogBuffer::new(3);
        for i in 0..5 {
            log.push(format!("entry {i}"), Severity::Info, None);
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
        // Ids keep counting even after eviction.
        assert_eq!(log.entries().next().unwrap().id, 2);
    }

    #[test]
    fn test_detail_is_preserved() {
        let mut log = LogBuffer::new(2);
        let entry = log.push("anomaly".into(), Severity::Error, Some("score 0.42".into()));
        assert_eq!(entry.detail.as_deref(), Some("score 0.42"));
    }
}
