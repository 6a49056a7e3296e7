//! Local IPC server for `server-warden-ctl` and other presentation shells.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and routes them to the supervisor, which is the single source of truth
//! for state transitions — a tray menu, a GUI window, and the ctl binary
//! all drive the same handlers.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "status"}
//! {"command": "start"}
//! {"command": "stop"}
//! {"command": "restart"}
//! {"command": "logs", "lines": 50}
//! {"command": "open-browser"}
//! {"command": "open-uploads"}
//! {"command": "open-data"}
//! {"command": "set-port", "port": 4000}
//! {"command": "save-settings", "settings": {"auto_start": true}}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "config: server_port must be between 1 and 65535, got 0"}
//! ```

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::supervisor::{SettingsUpdate, Supervisor};
use crate::{AppError, Result};

/// Inbound IPC request from a presentation client.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Tail length for the `logs` command.
    lines: Option<usize>,
    /// New port for the `set-port` command.
    port: Option<u32>,
    /// Partial update for the `save-settings` command.
    settings: Option<SettingsUpdate>,
}

/// Outbound IPC response.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn from_result(result: Result<serde_json::Value>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    supervisor: Supervisor,
    ipc_name: String,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener_name = ipc_name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %ipc_name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %ipc_name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let supervisor = supervisor.clone();
                                tokio::spawn(handle_connection(stream, supervisor));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    supervisor: Supervisor,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &supervisor).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route an IPC command to the supervisor.
async fn dispatch_command(request: &IpcRequest, supervisor: &Supervisor) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    let _guard = span.enter();

    match request.command.as_str() {
        "status" => handle_status(supervisor).await,
        "start" => IpcResponse::from_result(
            supervisor
                .start()
                .await
                .map(|()| serde_json::json!({ "running": true })),
        ),
        "stop" => IpcResponse::from_result(
            supervisor
                .stop()
                .await
                .map(|()| serde_json::json!({ "running": false })),
        ),
        "restart" => IpcResponse::from_result(
            supervisor
                .restart()
                .await
                .map(|()| serde_json::json!({ "running": true })),
        ),
        "logs" => handle_logs(request, supervisor),
        "open-browser" => IpcResponse::from_result(
            supervisor
                .open_browser()
                .await
                .map(|()| serde_json::json!({ "opened": true })),
        ),
        "open-uploads" => IpcResponse::from_result(
            supervisor
                .open_uploads_folder()
                .await
                .map(|()| serde_json::json!({ "opened": true })),
        ),
        "open-data" => IpcResponse::from_result(
            supervisor
                .open_data_folder()
                .await
                .map(|()| serde_json::json!({ "opened": true })),
        ),
        "set-port" => handle_set_port(request, supervisor).await,
        "save-settings" => handle_save_settings(request, supervisor).await,
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}

/// Report running state, port, PID, and uptime.
async fn handle_status(supervisor: &Supervisor) -> IpcResponse {
    let status = supervisor.status().await;
    let uptime_seconds = status
        .started_at
        .map(|t| (chrono::Utc::now() - t).num_seconds());

    IpcResponse::success(serde_json::json!({
        "running": status.running,
        "port": status.port,
        "pid": status.pid,
        "started_at": status.started_at.map(|t| t.to_rfc3339()),
        "uptime_seconds": uptime_seconds,
    }))
}

/// Return the most recent log lines, oldest first.
fn handle_logs(request: &IpcRequest, supervisor: &Supervisor) -> IpcResponse {
    let count = request.lines.unwrap_or(50);
    let lines: Vec<serde_json::Value> = supervisor
        .logs()
        .tail(count)
        .iter()
        .map(|line| {
            serde_json::json!({
                "timestamp": line.timestamp.to_rfc3339(),
                "message": line.message,
            })
        })
        .collect();

    IpcResponse::success(serde_json::json!({ "lines": lines }))
}

/// Validate and persist a new server port.
async fn handle_set_port(request: &IpcRequest, supervisor: &Supervisor) -> IpcResponse {
    let Some(port) = request.port else {
        return IpcResponse::error("missing required 'port' field");
    };

    match supervisor.set_port(port).await {
        Ok(()) => IpcResponse::success(serde_json::json!({ "port": port })),
        Err(err) => IpcResponse::error(err.to_string()),
    }
}

/// Apply a partial settings update and return the resulting configuration.
async fn handle_save_settings(request: &IpcRequest, supervisor: &Supervisor) -> IpcResponse {
    let update = request.settings.clone().unwrap_or_default();
    match supervisor.save_settings(update).await {
        Ok(()) => {
            let config = supervisor.config_snapshot().await;
            IpcResponse::from_result(serde_json::to_value(&config).map_err(AppError::from))
        }
        Err(err) => IpcResponse::error(err.to_string()),
    }
}
