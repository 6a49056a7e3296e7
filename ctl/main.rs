#![forbid(unsafe_code)]

//! `server-warden-ctl` — local CLI companion for `server-warden`.
//!
//! Connects to the IPC socket and sends JSON commands to the daemon. Any
//! tray or GUI shell speaks the same protocol; this binary is the
//! reference client.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "server-warden-ctl",
    about = "Local CLI for the server-warden daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `--ipc-name`).
    #[arg(long, default_value = "server-warden")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show whether the server is running, its port, PID, and uptime.
    Status,

    /// Start the server process.
    Start,

    /// Stop the server process and reclaim the configured port.
    Stop,

    /// Restart the server process.
    Restart,

    /// Print recent log lines.
    Logs {
        /// Number of lines from the end of the log.
        #[arg(long, default_value_t = 50)]
        lines: usize,
    },

    /// Open the default browser at the server URL.
    Open,

    /// Open the uploads directory in the file manager.
    OpenUploads,

    /// Open the data directory in the file manager.
    OpenData,

    /// Change the configured server port.
    SetPort {
        /// New port, 1–65535.
        port: u16,
    },

    /// Update and persist daemon settings; omitted flags keep their value.
    SaveSettings {
        /// Start the server automatically when the daemon boots.
        #[arg(long)]
        auto_start: Option<bool>,

        /// Minimize to tray instead of exiting (presentation-layer hint).
        #[arg(long)]
        minimize_to_tray: Option<bool>,

        /// Open the browser after the server starts.
        #[arg(long)]
        auto_open_browser: Option<bool>,

        /// Directory for user uploads.
        #[arg(long)]
        uploads_path: Option<PathBuf>,

        /// Directory for application data.
        #[arg(long)]
        data_path: Option<PathBuf>,
    },
}

fn main() {
    let args = Cli::parse();

    let request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Start => serde_json::json!({ "command": "start" }),
        Command::Stop => serde_json::json!({ "command": "stop" }),
        Command::Restart => serde_json::json!({ "command": "restart" }),
        Command::Logs { lines } => {
            serde_json::json!({ "command": "logs", "lines": lines })
        }
        Command::Open => serde_json::json!({ "command": "open-browser" }),
        Command::OpenUploads => serde_json::json!({ "command": "open-uploads" }),
        Command::OpenData => serde_json::json!({ "command": "open-data" }),
        Command::SetPort { port } => {
            serde_json::json!({ "command": "set-port", "port": port })
        }
        Command::SaveSettings {
            auto_start,
            minimize_to_tray,
            auto_open_browser,
            uploads_path,
            data_path,
        } => {
            let mut settings = serde_json::Map::new();
            if let Some(value) = auto_start {
                settings.insert("auto_start".into(), (*value).into());
            }
            if let Some(value) = minimize_to_tray {
                settings.insert("minimize_to_tray".into(), (*value).into());
            }
            if let Some(value) = auto_open_browser {
                settings.insert("auto_open_browser".into(), (*value).into());
            }
            if let Some(path) = uploads_path {
                settings.insert("uploads_path".into(), path.display().to_string().into());
            }
            if let Some(path) = data_path {
                settings.insert("data_path".into(), path.display().to_string().into());
            }
            serde_json::json!({ "command": "save-settings", "settings": settings })
        }
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is server-warden running with ipc name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    // Send request as a single JSON line.
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    // Read response line.
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
