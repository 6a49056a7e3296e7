#![forbid(unsafe_code)]

//! Headless supervisor for a packaged web application server.
//!
//! Owns one child server process: start, stop, restart, output monitoring,
//! settings persistence, and a local IPC control surface for presentation
//! layers (tray shells, GUIs, the `server-warden-ctl` CLI).

pub mod config;
pub mod errors;
pub mod ipc;
pub mod logbuf;
pub mod supervisor;

pub use config::ServerConfig;
pub use errors::{AppError, Result};
pub use supervisor::{SettingsUpdate, Supervisor};
