use server_warden::config::{validate_port, ServerConfig};

fn sample_json(port: u16) -> String {
    format!(
        r#"{{
  "server_port": {port},
  "uploads_path": "/tmp/warden-test/uploads",
  "data_path": "/tmp/warden-test/data",
  "auto_start": false,
  "minimize_to_tray": true,
  "auto_open_browser": false
}}"#
    )
}

#[test]
fn parses_valid_config() {
    let config = ServerConfig::from_json_str(&sample_json(4000)).expect("config parses");

    assert_eq!(config.server_port, 4000);
    assert!(!config.auto_start);
    assert!(config.minimize_to_tray);
    assert!(!config.auto_open_browser);
}

#[test]
fn missing_keys_fall_back_to_defaults() {
    let config = ServerConfig::from_json_str(r#"{"server_port": 8080}"#).expect("config parses");

    assert_eq!(config.server_port, 8080);
    assert!(!config.auto_start);
    assert!(config.minimize_to_tray);
    assert!(config.auto_open_browser);
    assert_eq!(config.server_command, "npm");
    assert_eq!(config.server_args, vec!["start".to_owned()]);
}

#[test]
fn empty_document_is_all_defaults() {
    let config = ServerConfig::from_json_str("{}").expect("config parses");
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn rejects_port_zero() {
    let result = ServerConfig::from_json_str(&sample_json(0));
    assert!(result.is_err(), "port 0 must be rejected");
}

#[test]
fn rejects_port_above_range() {
    // 70000 does not fit in u16, so parsing itself fails.
    let raw = r#"{"server_port": 70000}"#;
    assert!(ServerConfig::from_json_str(raw).is_err());
}

#[test]
fn unknown_keys_are_preserved() {
    let raw = r#"{"server_port": 3000, "tray_theme": "dark"}"#;
    let config = ServerConfig::from_json_str(raw).expect("config parses");

    assert_eq!(
        config.extra.get("tray_theme").and_then(|v| v.as_str()),
        Some("dark")
    );

    let rendered = serde_json::to_string(&config).expect("serializes");
    assert!(rendered.contains("tray_theme"), "unknown key survives save");
}

#[test]
fn port_round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("server_config.json");

    for port in [1u16, 80, 3000, 65535] {
        let mut config = ServerConfig::default();
        config.server_port = port;
        config.save_to_path(&path).expect("save succeeds");

        let raw = std::fs::read_to_string(&path).expect("read config");
        let loaded = ServerConfig::from_json_str(&raw).expect("reload");
        assert_eq!(loaded.server_port, port);
    }
}

#[test]
fn invalid_port_rejected_and_file_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("server_config.json");

    let mut config = ServerConfig::default();
    config.server_port = 4000;
    config.save_to_path(&path).expect("save succeeds");
    let before = std::fs::read_to_string(&path).expect("read config");

    // set_port rejects out-of-range and retains the prior value.
    assert!(config.set_port(0).is_err());
    assert!(config.set_port(65536).is_err());
    assert_eq!(config.server_port, 4000);

    assert!(config.set_port(5000).is_ok());
    assert_eq!(config.server_port, 5000);

    // Forcing an invalid state through the struct cannot reach the disk.
    config.server_port = 0;
    assert!(config.save_to_path(&path).is_err());
    let after = std::fs::read_to_string(&path).expect("read config");
    assert_eq!(before, after, "file untouched after rejected save");
}

#[test]
fn load_or_create_writes_defaults_on_first_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("server_config.json");

    let config = ServerConfig::load_or_create(&path);
    assert_eq!(config.server_port, 3000);
    assert!(path.exists(), "defaults persisted on first run");
}

#[test]
fn load_or_create_falls_back_on_garbage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("server_config.json");
    std::fs::write(&path, "not json at all").expect("write garbage");

    let config = ServerConfig::load_or_create(&path);
    assert_eq!(config, ServerConfig::default());

    // The broken file is left alone for the user to repair.
    let raw = std::fs::read_to_string(&path).expect("read config");
    assert_eq!(raw, "not json at all");
}

#[test]
fn validate_port_covers_full_range() {
    assert!(validate_port(0).is_err());
    assert_eq!(validate_port(1).expect("valid"), 1);
    assert_eq!(validate_port(65535).expect("valid"), 65535);
    assert!(validate_port(65536).is_err());
    assert!(validate_port(1_000_000).is_err());
}

#[test]
fn ensure_directories_creates_missing_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ServerConfig::default();
    config.uploads_path = dir.path().join("public").join("uploads");
    config.data_path = dir.path().join("data");

    config.ensure_directories().expect("directories created");
    assert!(config.uploads_path.is_dir());
    assert!(config.data_path.is_dir());

    // Idempotent on existing directories.
    config.ensure_directories().expect("second call is a no-op");
}
