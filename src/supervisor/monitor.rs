//! Background monitoring of the supervised child process.
//!
//! Two kinds of tasks run while a child is live:
//!
//! - **Output drains** — one per stream (stdout, stderr), each driving a
//!   [`FramedRead`] over [`OutputLineCodec`] and appending every decoded
//!   line to the shared [`LogBuffer`]. Decoding is lossy and never stops
//!   the drain.
//! - **Exit watcher** — polls the tracked child with `try_wait`; when the
//!   child exits on its own the watcher logs the exit (non-zero codes as
//!   abnormal termination), clears the tracked handle, and stops. A
//!   `stop()` that empties the slot first also ends the watcher.

use std::process::ExitStatus;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::logbuf::LogBuffer;
use crate::supervisor::codec::OutputLineCodec;

/// Shared slot holding the single supervised child, or `None` when stopped.
pub type ChildSlot = Arc<Mutex<Option<Child>>>;

/// Shared start time of the current child, or `None` when stopped.
pub type StartTimeSlot = Arc<StdMutex<Option<DateTime<Utc>>>>;

/// Interval between exit-watcher polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Spawn a drain task that forwards each line of `stream` to `logs`.
///
/// The task ends on EOF or on an unrecoverable read error; either way the
/// log sink records what happened and the supervisor keeps running.
#[must_use]
pub fn spawn_output_drain<R>(stream: R, logs: LogBuffer) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, OutputLineCodec::new());
        loop {
            match framed.next().await {
                None => {
                    debug!("output drain: EOF");
                    break;
                }
                Some(Ok(line)) => {
                    logs.append(line);
                }
                Some(Err(err)) => {
                    warn!(%err, "output drain: read error, stopping");
                    logs.append(format!("server output stream error: {err}"));
                    break;
                }
            }
        }
    })
}

/// Spawn the exit watcher over the shared child slot.
///
/// Polls every [`POLL_INTERVAL`]. Three ways out:
/// - the slot is empty (a `stop()` took the handle) — exit silently;
/// - `try_wait` reports an exit — log it, clear the slot and the start
///   time, exit;
/// - `try_wait` itself fails — treat the handle as dead and clean up.
#[must_use]
pub fn spawn_exit_watcher(
    slot: ChildSlot,
    started_at: StartTimeSlot,
    logs: LogBuffer,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let mut guard = slot.lock().await;
            let Some(child) = guard.as_mut() else {
                // stop() already reclaimed the handle.
                break;
            };

            match child.try_wait() {
                Ok(Some(status)) => {
                    *guard = None;
                    drop(guard);
                    clear_start_time(&started_at);
                    report_exit(status, &logs);
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    *guard = None;
                    drop(guard);
                    clear_start_time(&started_at);
                    warn!(%err, "failed to poll server process status");
                    logs.append(format!("lost track of server process: {err}"));
                    break;
                }
            }
        }
    })
}

fn clear_start_time(started_at: &StartTimeSlot) {
    if let Ok(mut guard) = started_at.lock() {
        *guard = None;
    }
}

/// Record a self-initiated child exit in the log sink.
fn report_exit(status: ExitStatus, logs: &LogBuffer) {
    if status.success() {
        info!("server process exited normally");
        logs.append("server exited (code 0)");
    } else {
        let text = status.code().map_or_else(
            || "server terminated by signal".to_owned(),
            |code| format!("server exited abnormally (code {code})"),
        );
        warn!(status = %text, "server process exited unexpectedly");
        logs.append(text);
    }
}
