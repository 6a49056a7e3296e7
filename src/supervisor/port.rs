//! Port reclaim safety net.
//!
//! A crash in a previous run can leave an orphaned server process holding
//! the configured port with no tracked handle pointing at it. After every
//! stop, the supervisor scans the OS for a process listening on that port
//! and asks it to terminate. The scan shells out to the platform's socket
//! table tool (`lsof` on Unix, `netstat -ano` on Windows); a failed lookup
//! is logged and swallowed, but a holder that survives termination is
//! reported as a port conflict so `stop()` can surface it.

use tokio::process::Command;
use tracing::{debug, warn};

use crate::logbuf::LogBuffer;
use crate::{AppError, Result};

/// Terminate whatever foreign process is listening on `port`, if any.
///
/// Skips the supervisor's own PID. A failed lookup is treated as "port
/// free" and logged at debug level.
///
/// # Errors
///
/// Returns `AppError::PortConflict` if a foreign holder was found but
/// could not be terminated.
pub async fn reclaim_port(port: u16, logs: &LogBuffer) -> Result<()> {
    match pid_listening_on_port(port).await {
        Ok(Some(pid)) if pid == std::process::id() => {
            debug!(port, pid, "port held by supervisor itself, skipping");
            Ok(())
        }
        Ok(Some(pid)) => match terminate_pid(pid).await {
            Ok(()) => {
                logs.append(format!("terminated stray process {pid} holding port {port}"));
                Ok(())
            }
            Err(err) => {
                warn!(port, pid, %err, "failed to terminate port holder");
                logs.append(format!(
                    "could not terminate process {pid} on port {port}: {err}"
                ));
                Err(AppError::PortConflict(format!(
                    "process {pid} still holds port {port}: {err}"
                )))
            }
        },
        Ok(None) => {
            debug!(port, "no process listening on port");
            Ok(())
        }
        Err(err) => {
            // Typically the lookup tool is missing; the port is probably free.
            debug!(port, %err, "port holder lookup failed");
            Ok(())
        }
    }
}

/// Find the PID of the process listening on `port`.
///
/// # Errors
///
/// Returns `AppError::Io` if the platform lookup tool cannot be executed.
#[cfg(unix)]
pub async fn pid_listening_on_port(port: u16) -> Result<Option<u32>> {
    let output = Command::new("lsof")
        .args(["-ti", &format!("tcp:{port}"), "-sTCP:LISTEN"])
        .output()
        .await
        .map_err(|err| AppError::Io(format!("failed to run lsof: {err}")))?;

    // lsof exits non-zero when nothing matches; that is "port free", not an error.
    Ok(parse_lsof_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Find the PID of the process listening on `port`.
///
/// # Errors
///
/// Returns `AppError::Io` if the platform lookup tool cannot be executed.
#[cfg(not(unix))]
pub async fn pid_listening_on_port(port: u16) -> Result<Option<u32>> {
    let output = Command::new("netstat")
        .args(["-ano"])
        .output()
        .await
        .map_err(|err| AppError::Io(format!("failed to run netstat: {err}")))?;

    Ok(parse_netstat_output(
        &String::from_utf8_lossy(&output.stdout),
        port,
    ))
}

/// Parse `lsof -t` output: one PID per line, first match wins.
#[must_use]
pub fn parse_lsof_output(output: &str) -> Option<u32> {
    output.lines().find_map(|line| line.trim().parse().ok())
}

/// Parse `netstat -ano` output for a listener on `port`.
///
/// Matches lines of the form
/// `TCP  0.0.0.0:3000  0.0.0.0:0  LISTENING  1234` where the local address
/// ends with `:port`.
#[must_use]
pub fn parse_netstat_output(output: &str, port: u16) -> Option<u32> {
    let suffix = format!(":{port}");
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let proto = fields.next()?;
        let local = fields.next()?;
        let _remote = fields.next()?;
        let state = fields.next()?;
        let pid = fields.next()?;

        if proto.eq_ignore_ascii_case("tcp")
            && local.ends_with(&suffix)
            && state.eq_ignore_ascii_case("LISTENING")
        {
            pid.parse().ok()
        } else {
            None
        }
    })
}

/// Send a termination request to `pid`.
///
/// # Errors
///
/// Returns `AppError::Termination` if the signal cannot be delivered
/// (permission denied, process already gone in a racy way).
#[cfg(unix)]
async fn terminate_pid(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let target = i32::try_from(pid)
        .map_err(|_| AppError::Termination(format!("pid {pid} out of range")))?;
    tokio::task::spawn_blocking(move || {
        kill(Pid::from_raw(target), Signal::SIGTERM)
            .map_err(|err| AppError::Termination(format!("SIGTERM to pid {pid} failed: {err}")))
    })
    .await
    .map_err(|err| AppError::Termination(format!("terminate task panicked: {err}")))?
}

/// Send a termination request to `pid`.
///
/// # Errors
///
/// Returns `AppError::Termination` if `taskkill` cannot be executed or
/// reports failure.
#[cfg(not(unix))]
async fn terminate_pid(pid: u32) -> Result<()> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()
        .await
        .map_err(|err| AppError::Termination(format!("failed to run taskkill: {err}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(AppError::Termination(format!(
            "taskkill for pid {pid} exited with {status}"
        )))
    }
}
