//! Bounded, most-recent-first activity log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// A log line produced by a decision, before it is timestamped
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub severity: Severity,
    pub message: String,
}

impl LogLine {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the front, dropping the oldest entry past capacity
    pub fn push(&mut self, entry: ActivityEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.entries.front()
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

    fn entry(n: usize) -> ActivityEntry {
        ActivityEntry {
            time: Utc::now(),
            severity: Severity::Info,
            message: format!("entry {}", n),
        }
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let mut log = ActivityLog::new(10);
        for n in 0..15 {
            log.push(entry(n));
        }

        assert_eq!(log.len(), 10);
        assert_eq!(log.latest().unwrap().message, "entry 14");
        assert_eq!(log.entries().last().unwrap().message, "entry 5");
    }
}
