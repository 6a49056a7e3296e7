//! Restart composition: stop, settle, start.

use serial_test::serial;

use super::test_helpers::{count_log_lines, test_supervisor};

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn restart_yields_one_live_child_on_same_port() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);
    let port_before = supervisor.current_port().await;

    supervisor.start().await.expect("initial start");
    let pid_before = supervisor.status().await.pid;

    supervisor.restart().await.expect("restart succeeds");

    assert!(supervisor.is_running().await);
    let status = supervisor.status().await;
    assert_eq!(status.port, port_before, "port unchanged across restart");
    assert_ne!(status.pid, pid_before, "a fresh child was spawned");
    assert_eq!(count_log_lines(&supervisor, "restarting server"), 1);

    supervisor.stop().await.expect("cleanup stop");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn restart_from_stopped_just_starts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), "sh", &["-c", "sleep 30"]);

    supervisor.restart().await.expect("restart succeeds");

    assert!(supervisor.is_running().await);
    assert_eq!(count_log_lines(&supervisor, "server is not running"), 1);

    supervisor.stop().await.expect("cleanup stop");
}
