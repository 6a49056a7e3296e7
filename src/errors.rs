//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Every variant is recoverable from the supervisor's perspective: a failed
/// operation leaves the supervisor in a well-defined state and the next
/// start/stop request is still accepted.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure (invalid port, bad paths).
    Config(String),
    /// Child server process could not be created.
    Spawn(String),
    /// Graceful stop failed and the forced kill also failed.
    Termination(String),
    /// A foreign process still holds the configured port.
    PortConflict(String),
    /// IPC communication failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Termination(msg) => write!(f, "termination: {msg}"),
            Self::PortConflict(msg) => write!(f, "port conflict: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
