//! Per-request progress log.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One timestamped progress entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub ts_utc: DateTime<Utc>,
    pub text: String,
}

impl LogEntry {
    /// Renders the entry in the service's log line format:
    /// `DD/MM/YYYY HH:MM:SS => text`.
    pub fn render(&self) -> String {
        format!("{} => {}", self.ts_utc.format("%d/%m/%Y %H:%M:%S"), self.text)
    }
}

/// Append-only log scoped to one request call. A fresh log is created at the
/// start of every call; the finished log travels inside the response, so a
/// response always reflects exactly the call that produced it.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Vec<LogEntry>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push(LogEntry {
            ts_utc: Utc::now(),
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Rendered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(LogEntry::render).collect()
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
