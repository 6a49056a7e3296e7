//! Start/stop lifecycle: single-child invariant, idempotency, and
//! failure surfacing.

use serial_test::serial;

use super::test_helpers::{count_log_lines, test_supervisor};

#[tokio::test]
#[serial]
async fn stop_while_stopped_is_a_logged_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);

    supervisor.stop().await.expect("stop succeeds");

    assert!(!supervisor.is_running().await);
    assert_eq!(count_log_lines(&supervisor, "server is not running"), 1);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn start_then_stop_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);

    supervisor.start().await.expect("start succeeds");
    assert!(supervisor.is_running().await);

    let status = supervisor.status().await;
    assert!(status.running);
    assert!(status.pid.is_some());
    assert!(status.started_at.is_some());

    supervisor.stop().await.expect("stop succeeds");
    assert!(!supervisor.is_running().await);

    let status = supervisor.status().await;
    assert!(!status.running);
    assert!(status.pid.is_none());
    assert!(status.started_at.is_none());
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn second_start_is_a_no_op_with_one_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);

    supervisor.start().await.expect("first start");
    let first_pid = supervisor.status().await.pid;

    supervisor.start().await.expect("second start is a no-op");
    let second_pid = supervisor.status().await.pid;

    assert_eq!(first_pid, second_pid, "no second child was spawned");
    assert_eq!(count_log_lines(&supervisor, "server is already running"), 1);

    supervisor.stop().await.expect("cleanup stop");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn port_is_bindable_after_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);
    let port = supervisor.current_port().await;

    supervisor.start().await.expect("start succeeds");
    supervisor.stop().await.expect("stop succeeds");

    let bind = std::net::TcpListener::bind(("127.0.0.1", port));
    assert!(bind.is_ok(), "port {port} still held after stop");
}

#[tokio::test]
#[serial]
async fn spawn_failure_is_surfaced_and_recoverable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "definitely-not-a-real-command-xyz", &[]);

    let err = supervisor.start().await.expect_err("spawn must fail");
    assert!(err.to_string().starts_with("spawn:"));
    assert!(!supervisor.is_running().await);
    assert!(count_log_lines(&supervisor, "failed to start server") >= 1);

    // The supervisor still accepts requests after a failure.
    supervisor.stop().await.expect("stop still works");
    assert!(!supervisor.is_running().await);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn start_creates_configured_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);

    supervisor.start().await.expect("start succeeds");

    let config = supervisor.config_snapshot().await;
    assert!(config.uploads_path.is_dir());
    assert!(config.data_path.is_dir());

    supervisor.stop().await.expect("cleanup stop");
}
