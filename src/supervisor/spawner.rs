//! Server process spawner.
//!
//! Launches the packaged web application's production start command with
//! `kill_on_drop(true)` for safety. The listening port is fixed through the
//! `PORT` environment variable and the runtime is forced into production
//! mode via `NODE_ENV`; the artifact itself is treated as opaque.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::info;

use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Spawn the configured server command in `working_dir`.
///
/// Creates the uploads and data directories first, then spawns the child
/// with piped stdout/stderr and a null stdin. Returns as soon as the
/// process handle exists — this is not a readiness probe; the server may
/// still be binding its port when this returns.
///
/// # Errors
///
/// Returns `AppError::Config` if a required directory cannot be created, or
/// `AppError::Spawn` if the process cannot be started (missing artifact,
/// permission denied).
pub fn spawn_server(config: &ServerConfig, working_dir: &Path) -> Result<Child> {
    config.ensure_directories()?;

    let mut cmd = Command::new(&config.server_command);
    cmd.args(&config.server_args)
        .env("PORT", config.server_port.to_string())
        .env("NODE_ENV", "production")
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn '{}': {err}",
            config.server_command
        ))
    })?;

    info!(
        pid = child.id().unwrap_or(0),
        command = %config.server_command,
        port = config.server_port,
        "server process spawned"
    );

    Ok(child)
}
