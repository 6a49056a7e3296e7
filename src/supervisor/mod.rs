//! Local process supervisor for the packaged web application server.
//!
//! Owns the lifecycle of a single child server process: spawn it with the
//! configured port, drain its combined output into the log buffer, stop it
//! gracefully with a bounded fallback to a forced kill, and reclaim the
//! configured port from stray holders. The supervisor has exactly two
//! states — stopped and running — tracked by whether the shared child slot
//! is occupied.

pub mod codec;
pub mod monitor;
pub mod port;
pub mod spawner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::logbuf::LogBuffer;
use crate::supervisor::monitor::{ChildSlot, StartTimeSlot};
use crate::{AppError, Result};

/// Bounded wait for a voluntary exit after the graceful-terminate signal.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Settling delay between stop and start during a restart, giving the OS
/// time to release the port.
const RESTART_SETTLE: Duration = Duration::from_secs(2);

/// Settling delay before opening the browser after a start; not a
/// readiness check, just time for the server to bind.
const BROWSER_SETTLE: Duration = Duration::from_secs(3);

/// Point-in-time view of the supervisor for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Whether a child server process is currently tracked.
    pub running: bool,
    /// Configured listening port.
    pub port: u16,
    /// PID of the live child, when running.
    pub pid: Option<u32>,
    /// UTC time the current child was started, when running.
    pub started_at: Option<DateTime<Utc>>,
}

/// Owner of the single supervised server process and its settings.
///
/// Cheap to clone; clones share the same child slot, configuration, and
/// log buffer, so IPC handlers and background tasks all see one source of
/// truth for state transitions.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: Arc<RwLock<ServerConfig>>,
    config_path: PathBuf,
    working_dir: PathBuf,
    child: ChildSlot,
    logs: LogBuffer,
    started_at: StartTimeSlot,
}

/// Partial settings update; unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    /// Start the server automatically when the daemon boots.
    pub auto_start: Option<bool>,
    /// Presentation-layer hint: minimize to tray instead of exiting.
    pub minimize_to_tray: Option<bool>,
    /// Open the browser after the server starts.
    pub auto_open_browser: Option<bool>,
    /// Directory for user uploads.
    pub uploads_path: Option<PathBuf>,
    /// Directory for application data.
    pub data_path: Option<PathBuf>,
}

impl Supervisor {
    /// Create a supervisor around `config`, persisting changes to
    /// `config_path` and launching the server in `working_dir`.
    #[must_use]
    pub fn new(config: ServerConfig, config_path: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            working_dir,
            child: Arc::new(Mutex::new(None)),
            logs: LogBuffer::new(),
            started_at: Arc::new(StdMutex::new(None)),
        }
    }

    /// Shared log buffer fed by the supervisor and the child's output.
    #[must_use]
    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// Directory the server command runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Whether a child server process is currently tracked.
    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Currently configured listening port.
    pub async fn current_port(&self) -> u16 {
        self.config.read().await.server_port
    }

    /// Copy of the current settings.
    pub async fn config_snapshot(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    /// Build a point-in-time status report.
    pub async fn status(&self) -> StatusReport {
        let (running, pid) = {
            let guard = self.child.lock().await;
            match guard.as_ref() {
                Some(child) => (true, child.id()),
                None => (false, None),
            }
        };

        StatusReport {
            running,
            port: self.current_port().await,
            pid,
            started_at: self.start_time(),
        }
    }

    /// Start the server process.
    ///
    /// A no-op with a logged notice when a child is already tracked — a
    /// second start never spawns a second process. On success the child
    /// handle is stored, output drains and the exit watcher are running,
    /// and (when configured) a browser-open task is scheduled after a
    /// short settle delay. Does not wait for the server to become ready.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if required directories cannot be
    /// created, or `AppError::Spawn` if the process cannot be launched.
    /// Both leave the supervisor stopped and able to retry.
    pub async fn start(&self) -> Result<()> {
        // The slot lock is held across the spawn so two concurrent starts
        // cannot both observe "stopped" and fork twice.
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            info!("start requested while server already running");
            self.logs.append("server is already running");
            return Ok(());
        }

        let config = self.config.read().await.clone();
        self.logs.append("starting server...");

        let mut child = match spawner::spawn_server(&config, &self.working_dir) {
            Ok(child) => child,
            Err(err) => {
                self.logs.append(format!("failed to start server: {err}"));
                return Err(err);
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let _ = monitor::spawn_output_drain(stdout, self.logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            let _ = monitor::spawn_output_drain(stderr, self.logs.clone());
        }

        *guard = Some(child);
        drop(guard);

        self.set_start_time(Some(Utc::now()));
        let _ = monitor::spawn_exit_watcher(
            Arc::clone(&self.child),
            Arc::clone(&self.started_at),
            self.logs.clone(),
        );

        self.logs
            .append(format!("server started on port {}", config.server_port));

        if config.auto_open_browser {
            self.schedule_browser_open(config.server_port);
        }

        Ok(())
    }

    /// Stop the server process.
    ///
    /// Sends a graceful termination request, waits up to [`STOP_GRACE`]
    /// for a voluntary exit, and force-kills on timeout. Whether or not a
    /// tracked child existed, any stray process still listening on the
    /// configured port is terminated afterwards. The tracked handle is
    /// always cleared — the supervisor ends up stopped even on failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Termination` if the forced kill failed, or
    /// `AppError::PortConflict` if a foreign process holds the configured
    /// port and could not be terminated; the state is still stopped and a
    /// later start is accepted.
    pub async fn stop(&self) -> Result<()> {
        let taken = self.child.lock().await.take();
        self.set_start_time(None);

        let mut failure = None;
        if let Some(child) = taken {
            self.logs.append("stopping server...");
            if let Err(err) = shutdown_child(child, &self.logs).await {
                failure = Some(err);
            }
        } else {
            info!("stop requested while server not running");
            self.logs.append("server is not running");
        }

        // Safety net for orphans from a prior run the supervisor lost
        // track of.
        let port = self.current_port().await;
        if let Err(err) = port::reclaim_port(port, &self.logs).await {
            if failure.is_none() {
                failure = Some(err);
            }
        }

        match failure {
            Some(err) => {
                self.logs.append(format!("stop finished with error: {err}"));
                Err(err)
            }
            None => {
                self.logs.append("server stopped");
                Ok(())
            }
        }
    }

    /// Restart the server: stop, settle, start.
    ///
    /// The settle delay lets the OS release the listening port before the
    /// new child binds it.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`Supervisor::stop`] or
    /// [`Supervisor::start`].
    pub async fn restart(&self) -> Result<()> {
        self.logs.append("restarting server...");
        self.stop().await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start().await
    }

    /// Open the default browser at `http://localhost:<port>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the OS launcher reports a failure.
    pub async fn open_browser(&self) -> Result<()> {
        let port = self.current_port().await;
        let url = format!("http://localhost:{port}");
        open_url(&url).await?;
        self.logs.append(format!("opened {url} in browser"));
        Ok(())
    }

    /// Update and persist the configured port.
    ///
    /// Out-of-range values are rejected and the prior configuration is
    /// retained in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid port or `AppError::Io` if
    /// the settings file cannot be written.
    pub async fn set_port(&self, port: u32) -> Result<()> {
        let mut config = self.config.write().await;
        let previous = config.server_port;
        config.set_port(port)?;

        if let Err(err) = config.save_to_path(&self.config_path) {
            config.server_port = previous;
            return Err(err);
        }

        self.logs
            .append(format!("server port changed to {} (was {previous})", config.server_port));
        Ok(())
    }

    /// Apply a partial settings update and persist the result.
    ///
    /// Unset fields keep their current value. Directories named by the
    /// updated settings are created before the write. On any failure the
    /// previous settings are restored in memory and the file on disk is
    /// left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a directory cannot be created or the
    /// updated settings fail validation, or `AppError::Io` if the settings
    /// file cannot be written.
    pub async fn save_settings(&self, update: SettingsUpdate) -> Result<()> {
        let mut config = self.config.write().await;
        let previous = config.clone();

        if let Some(value) = update.auto_start {
            config.auto_start = value;
        }
        if let Some(value) = update.minimize_to_tray {
            config.minimize_to_tray = value;
        }
        if let Some(value) = update.auto_open_browser {
            config.auto_open_browser = value;
        }
        if let Some(path) = update.uploads_path {
            config.uploads_path = path;
        }
        if let Some(path) = update.data_path {
            config.data_path = path;
        }

        let result = config
            .ensure_directories()
            .and_then(|()| config.save_to_path(&self.config_path));
        if let Err(err) = result {
            *config = previous;
            return Err(err);
        }

        self.logs.append("settings saved");
        Ok(())
    }

    /// Open the uploads directory in the OS file manager, creating it if
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created or the OS
    /// launcher reports a failure.
    pub async fn open_uploads_folder(&self) -> Result<()> {
        let path = self.config.read().await.uploads_path.clone();
        self.open_folder(path).await
    }

    /// Open the data directory in the OS file manager, creating it if
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created or the OS
    /// launcher reports a failure.
    pub async fn open_data_folder(&self) -> Result<()> {
        let path = self.config.read().await.data_path.clone();
        self.open_folder(path).await
    }

    async fn open_folder(&self, path: PathBuf) -> Result<()> {
        std::fs::create_dir_all(&path).map_err(|err| {
            AppError::Io(format!("cannot create directory {}: {err}", path.display()))
        })?;

        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || open::that(path))
            .await
            .map_err(|err| AppError::Io(format!("folder task panicked: {err}")))?
            .map_err(|err| AppError::Io(format!("failed to open folder: {err}")))?;

        self.logs.append(format!("opened folder {display}"));
        Ok(())
    }

    fn schedule_browser_open(&self, port: u16) {
        let logs = self.logs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(BROWSER_SETTLE).await;
            let url = format!("http://localhost:{port}");
            match open_url(&url).await {
                Ok(()) => logs.append(format!("opened {url} in browser")),
                Err(err) => {
                    warn!(%err, url, "failed to open browser");
                    logs.append(format!("could not open browser: {err}"));
                }
            }
        });
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.started_at.lock().ok().and_then(|g| *g)
    }

    fn set_start_time(&self, value: Option<DateTime<Utc>>) {
        if let Ok(mut guard) = self.started_at.lock() {
            *guard = value;
        }
    }
}

/// Graceful-then-forced shutdown of a child the supervisor owns.
///
/// Unix children get SIGTERM so a well-behaved server can flush and exit;
/// elsewhere the kill request is issued directly. After [`STOP_GRACE`]
/// without an exit the child is force-killed.
async fn shutdown_child(mut child: tokio::process::Child, logs: &LogBuffer) -> Result<()> {
    request_graceful_exit(&mut child);

    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            info!(?status, "server process exited");
            Ok(())
        }
        Ok(Err(err)) => {
            warn!(%err, "error waiting for server process");
            Err(AppError::Termination(format!(
                "error waiting for server process: {err}"
            )))
        }
        Err(_) => {
            warn!("server did not exit within grace period, forcing kill");
            logs.append("server did not stop in time, killing it");
            child.kill().await.map_err(|err| {
                AppError::Termination(format!("forced kill failed: {err}"))
            })
        }
    }
}

#[cfg(unix)]
fn request_graceful_exit(child: &mut tokio::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        // Already reaped; nothing to signal.
        return;
    };

    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(child: &mut tokio::process::Child) {
    // No portable graceful signal; issue the kill request and let the
    // bounded wait below pick up the exit.
    if let Err(err) = child.start_kill() {
        warn!(%err, "kill request failed");
    }
}

/// Launch the OS default browser at `url` without blocking the runtime.
async fn open_url(url: &str) -> Result<()> {
    let url = url.to_owned();
    tokio::task::spawn_blocking(move || open::that(url))
        .await
        .map_err(|err| AppError::Io(format!("browser task panicked: {err}")))?
        .map_err(|err| AppError::Io(format!("failed to open browser: {err}")))
}
