//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use darkstar_query::config::{MasterConfig, ServerConfig};
use darkstar_query::query::QueryOptions;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = MasterConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_invalid_listen_ip() {
    let mut config = MasterConfig::default();
    config.server.listen_ip = "not-an-ip".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid listen_ip")));
}

#[test]
fn test_packet_size_bounds() {
    let mut config = MasterConfig::default();
    config.server.max_packet_size = 63;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("max_packet_size out of range")));

    config.server.max_packet_size = 1501;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("max_packet_size out of range")));

    config.server.max_packet_size = 1500;
    assert!(config.validate().is_empty());
}

#[test]
fn test_buffer_smaller_than_packet() {
    let mut config = MasterConfig::default();
    config.server.max_buffer_size = 256;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("must be at least max_packet_size")));
}

#[test]
fn test_short_shutdown_timeout() {
    let mut config = MasterConfig::default();
    config.server.shutdown_timeout = Duration::from_millis(100);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Shutdown timeout too short")));
}

#[test]
fn test_directory_limits() {
    let mut config = MasterConfig::default();
    config.directory.hostname = "x".repeat(256);
    config.directory.motd = "y".repeat(246);
    config.directory.servers_per_ip = 0;
    config.directory.server_ttl = Duration::ZERO;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("hostname too long")));
    assert!(errors.iter().any(|e| e.contains("motd too long")));
    assert!(errors
        .iter()
        .any(|e| e.contains("servers_per_ip must be greater than 0")));
    assert!(errors
        .iter()
        .any(|e| e.contains("server_ttl must be greater than 0")));
}

#[test]
fn test_longest_motd_accepted() {
    let mut config = MasterConfig::default();
    config.directory.motd = "m".repeat(245);
    assert!(config.validate().is_empty());
}

#[test]
fn test_bad_cidrs() {
    let mut config = MasterConfig::default();
    config.bans.banned_networks = vec!["10.0.0.0/33".to_string(), "300.1.1.1".to_string()];
    config.nat.local_networks = vec!["192.168.0.0/xx".to_string()];

    let errors = config.validate();
    assert_eq!(
        errors
            .iter()
            .filter(|e| e.starts_with("banned_networks"))
            .count(),
        2
    );
    assert!(errors.iter().any(|e| e.starts_with("local_networks")));
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_zero_send_attempts() {
    let mut config = MasterConfig::default();
    config.query.send_attempts = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("send_attempts must be greater than 0")));
}

#[test]
fn test_query_options_follow_config() {
    let mut config = MasterConfig::default();
    config.query.timeout = Duration::from_millis(750);
    config.query.send_attempts = 3;
    config.query.skip_loopback_entries = false;

    let options = QueryOptions::from(&config.query);
    assert_eq!(options.timeout, Duration::from_millis(750));
    assert_eq!(options.send_attempts, 3);
    assert!(!options.skip_loopback_entries);
}

#[test]
fn test_save_and_reload() {
    let path = std::env::temp_dir().join(format!(
        "darkstar-config-{}-{}.toml",
        std::process::id(),
        rand::random::<u32>()
    ));
    let config = MasterConfig::default_with_overrides(|c| {
        c.directory.hostname = "Saved".to_string();
        c.logging.log_level = Level::DEBUG;
        c.logging.json_format = true;
    });

    config.save_to_file(&path).expect("save");
    let loaded = MasterConfig::from_file(&path).expect("load");
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_is_config_error() {
    let result = MasterConfig::from_file("/nonexistent/darkstar/mastersrv.toml");
    assert!(result.is_err());
}

#[test]
fn test_durations_are_milliseconds() {
    let text = toml::to_string(&ServerConfig::default()).expect("serialize");
    assert!(text.contains("shutdown_timeout = 5000"));
}

#[test]
fn test_example_config_parses() {
    let example = MasterConfig::example_config();
    let parsed = MasterConfig::from_toml(&example).expect("example parses");
    assert_eq!(parsed, MasterConfig::default());
}
