//! Relay config loading and validation from files on disk.

use std::io::Write;

use racewire::config::{defaults, ConfigError, RelayConfig};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn full_document_loads() {
    let file = write_config(
        r#"
[server]
addr = "127.0.0.1:9000"

[ingest]
udp_bind = "127.0.0.1:21000"
buffer_capacity = 2048
batch_max_points = 25

[aggregation]
tick_ms = 250
snapshot_points = 1024

[registry]
heartbeat_interval_secs = 5
heartbeat_timeout_secs = 15

[dispatch]
window_task_types = ["explainer"]
max_attempts = 5

[agents]
builtin = false

[sectors]
vir = [1800.0, 3600.0]
"#,
    );

    let config = RelayConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.server.addr, "127.0.0.1:9000");
    assert_eq!(config.ingest.buffer_capacity, 2048);
    assert_eq!(config.ingest.batch_max_age_ms, defaults::BATCH_MAX_AGE_MS);
    assert_eq!(config.aggregation.snapshot_points, 1024);
    assert_eq!(config.dispatch.window_task_types, vec!["explainer"]);
    assert_eq!(config.dispatch.max_attempts, 5);
    assert!(!config.agents.builtin);
    assert_eq!(config.sectors["vir"], vec![1800.0, 3600.0]);
}

#[test]
fn every_problem_is_reported_at_once() {
    let file = write_config(
        r#"
[ingest]
buffer_capacity = 100

[aggregation]
tick_ms = 0
snapshot_points = 500

[registry]
heartbeat_interval_secs = 10
heartbeat_timeout_secs = 10

[consumer]
ping_every = 8
max_consecutive_errors = 3
"#,
    );

    match RelayConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 4, "{errors:?}");
            assert!(errors.iter().any(|e| e.contains("tick_ms")));
            assert!(errors.iter().any(|e| e.contains("snapshot_points")));
            assert!(errors.iter().any(|e| e.contains("heartbeat_timeout_secs")));
            assert!(errors.iter().any(|e| e.contains("max_consecutive_errors")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn bad_sector_bounds_are_rejected() {
    let file = write_config("[sectors]\nsebring = [0.0, -5.0]\n");
    let err = RelayConfig::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("sectors.sebring"));
}

#[test]
fn parse_errors_name_the_file() {
    let file = write_config("[ingest\nudp_bind = ");
    let err = RelayConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(ref path, _) if path == file.path()));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RelayConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn written_config_reloads_identically() {
    let mut config = RelayConfig::default();
    config.consumer.block_ms = 750;
    config.sectors.insert("cota".to_string(), vec![1500.0, 3200.0]);

    let file = write_config(&config.to_toml().unwrap());
    let reloaded = RelayConfig::load_from_file(file.path()).unwrap();
    assert_eq!(reloaded.consumer.block_ms, 750);
    assert_eq!(reloaded.sectors["cota"], config.sectors["cota"]);
}
