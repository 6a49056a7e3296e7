//! Local IPC transport for presentation-layer clients.

pub mod server;
