//! Per-server stderr capture.
//!
//! MCP servers write diagnostics to stderr. Each line is logged through
//! `tracing` and kept in a bounded ring buffer so clients can fetch recent
//! output after a failed start.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured stderr line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Ring buffer of the most recent lines of one server.
#[derive(Debug)]
struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl LogBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, line: LogLine) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

/// Stderr buffers of all servers, keyed by server id.
#[derive(Debug)]
pub struct ServerLogs {
    buffers: RwLock<HashMap<String, LogBuffer>>,
    capacity: usize,
}

impl ServerLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a stderr line.
    pub fn push(&self, server_id: &str, line: impl Into<String>) {
        let entry = LogLine {
            timestamp: Utc::now(),
            line: line.into(),
        };
        let mut buffers = self
            .buffers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        buffers
            .entry(server_id.to_string())
            .or_insert_with(|| LogBuffer::new(self.capacity))
            .push(entry);
    }

    /// Retained lines, oldest first.
    pub fn lines(&self, server_id: &str) -> Vec<LogLine> {
        let buffers = self
            .buffers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        buffers
            .get(server_id)
            .map(|b| b.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the buffer of a removed server.
    pub fn remove(&self, server_id: &str) {
        self.buffers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(server_id);
    }
}
