#![forbid(unsafe_code)]

//! `server-warden` — supervisor daemon binary.
//!
//! Bootstraps the settings store, builds the supervisor, starts the IPC
//! server for presentation clients, honors `auto_start`, and stops the
//! child server gracefully on SIGTERM / ctrl-c.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use server_warden::config::ServerConfig;
use server_warden::ipc::server::spawn_ipc_server;
use server_warden::supervisor::Supervisor;
use server_warden::{AppError, Result};

/// Default settings file, resolved relative to the working directory.
const DEFAULT_CONFIG_FILE: &str = "server_config.json";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "server-warden", about = "Supervisor for a packaged web application server", version, long_about = None)]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Directory containing the packaged server artifact; defaults to the
    /// current working directory.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// IPC socket name presentation clients connect to.
    #[arg(long, default_value = "server-warden")]
    ipc_name: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("server-warden bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Resolve working directory ───────────────────────
    let working_dir = match args.working_dir {
        Some(dir) => dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid working dir: {err}")))?,
        None => std::env::current_dir()
            .map_err(|err| AppError::Config(format!("cannot resolve working dir: {err}")))?,
    };

    // ── Load settings ───────────────────────────────────
    let config_path = if args.config.is_absolute() {
        args.config.clone()
    } else {
        working_dir.join(&args.config)
    };
    let config = ServerConfig::load_or_create(&config_path);
    let auto_start = config.auto_start;
    info!(config = %config_path.display(), port = config.server_port, "settings loaded");

    // ── Build the supervisor ────────────────────────────
    let supervisor = Supervisor::new(config, config_path, working_dir);
    supervisor.logs().append("server manager started");

    // ── Start the IPC control surface ───────────────────
    let ct = CancellationToken::new();
    let ipc_handle = spawn_ipc_server(supervisor.clone(), args.ipc_name, ct.clone())?;

    // ── Auto-start the server when configured ───────────
    if auto_start {
        info!("auto_start enabled, starting server");
        if let Err(err) = supervisor.start().await {
            error!(%err, "auto-start failed");
        }
    }

    info!("server-warden ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Stop the child before exiting ───────────────────
    if supervisor.is_running().await {
        if let Err(err) = supervisor.stop().await {
            error!(%err, "error stopping server during shutdown");
        }
    }

    let _ = ipc_handle.await;
    info!("server-warden shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
