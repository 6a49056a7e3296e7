//! Append-only log buffer shared by the supervisor and its IPC clients.
//!
//! Every line — supervisor status messages and child process output alike —
//! is timestamped on append and kept in order. The buffer is unbounded by
//! design; this tool supervises one short-lived local server and rotation is
//! a non-goal. Live consumers subscribe through a [`tokio::sync::broadcast`]
//! channel so a slow client can never block the producer.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the live-subscriber broadcast channel. Laggy subscribers
/// miss lines rather than stalling the monitor loop.
const BROADCAST_CAPACITY: usize = 256;

/// A single timestamped log line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogLine {
    /// UTC timestamp assigned when the line was appended.
    pub timestamp: DateTime<Utc>,
    /// Line text, without the trailing newline.
    pub message: String,
}

impl LogLine {
    fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Thread-safe append-only sequence of timestamped log lines.
///
/// Cheap to clone — clones share the same underlying buffer and broadcast
/// channel.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<Vec<LogLine>>>,
    live: broadcast::Sender<LogLine>,
}

impl LogBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            live,
        }
    }

    /// Append one line, stamping it with the current UTC time.
    ///
    /// Also emits the line to every live subscriber; subscribers that have
    /// fallen behind simply miss it.
    pub fn append(&self, message: impl Into<String>) {
        let line = LogLine::new(message);
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(line.clone());
        }
        // No subscribers is not an error.
        let _ = self.live.send(line);
    }

    /// Subscribe to lines appended after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.live.subscribe()
    }

    /// Copy of the full buffer, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Copy of the most recent `n` lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<LogLine> {
        self.lines
            .lock()
            .map(|g| {
                let start = g.len().saturating_sub(n);
                g[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Number of lines appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().map(|g| g.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
