use server_warden::logbuf::LogBuffer;
use server_warden::supervisor::port::{parse_lsof_output, parse_netstat_output, reclaim_port};

#[test]
fn lsof_single_pid() {
    assert_eq!(parse_lsof_output("1234\n"), Some(1234));
}

#[test]
fn lsof_multiple_pids_takes_first() {
    assert_eq!(parse_lsof_output("1234\n5678\n"), Some(1234));
}

#[test]
fn lsof_empty_output_means_port_free() {
    assert_eq!(parse_lsof_output(""), None);
    assert_eq!(parse_lsof_output("\n"), None);
}

#[test]
fn lsof_ignores_garbage_lines() {
    assert_eq!(parse_lsof_output("lsof: warning\n4321\n"), Some(4321));
}

const NETSTAT_SAMPLE: &str = "\
Active Connections\n\
\n\
  Proto  Local Address          Foreign Address        State           PID\n\
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       900\n\
  TCP    0.0.0.0:3000           0.0.0.0:0              LISTENING       4321\n\
  TCP    127.0.0.1:3001         127.0.0.1:50000        ESTABLISHED     5555\n\
  UDP    0.0.0.0:3000           *:*                                    7777\n";

#[test]
fn netstat_finds_listener_on_port() {
    assert_eq!(parse_netstat_output(NETSTAT_SAMPLE, 3000), Some(4321));
}

#[test]
fn netstat_ignores_established_connections() {
    assert_eq!(parse_netstat_output(NETSTAT_SAMPLE, 3001), None);
}

#[test]
fn netstat_requires_exact_port_suffix() {
    // :300 must not match :3000.
    assert_eq!(parse_netstat_output(NETSTAT_SAMPLE, 300), None);
}

#[test]
fn netstat_no_match_for_free_port() {
    assert_eq!(parse_netstat_output(NETSTAT_SAMPLE, 9999), None);
}

#[test]
fn netstat_empty_output() {
    assert_eq!(parse_netstat_output("", 3000), None);
}

#[tokio::test]
async fn reclaiming_a_free_port_succeeds() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let logs = LogBuffer::new();
    assert!(reclaim_port(port, &logs).await.is_ok());
    // Nothing was holding the port, so nothing was terminated.
    assert_eq!(
        logs.snapshot()
            .iter()
            .filter(|line| line.message.contains("terminated"))
            .count(),
        0
    );
}
