use crate::config::{ClientConfig, ServerConfig, DEFAULT_FALLBACK_PROBE_URL, DEFAULT_SERVER_URL};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_client_config_defaults() {
    let config = ClientConfig::default();
    assert_eq!(config.server_url, DEFAULT_SERVER_URL);
    assert_eq!(config.fallback_probe_url, DEFAULT_FALLBACK_PROBE_URL);
    assert_eq!(config.listen_port, 0);
    assert!(!config.disable_mapping);
    assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    assert!(config.exchange_timeout() > ServerConfig::default().dial_timeout());
}

#[test]
fn test_server_config_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.http_port, 7777);
    assert_eq!(config.dial_timeout(), Duration::from_secs(20));
    assert!(config.public_ip.is_none());
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::load(dir.path().join("missing.json")).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_empty_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "  \n").unwrap();

    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(&path, r#"{"listen_port": 4001, "disable_mapping": true}"#).unwrap();

    let config = ClientConfig::load(&path).unwrap();
    assert_eq!(config.listen_port, 4001);
    assert!(config.disable_mapping);
    assert_eq!(config.server_url, DEFAULT_SERVER_URL);
}

#[test]
fn test_config_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("server.json");

    let config = ServerConfig {
        http_port: 8080,
        public_ip: Some("203.0.113.7".parse().unwrap()),
        ..ServerConfig::default()
    };
    config.save(&path).unwrap();

    assert_eq!(ServerConfig::load(&path).unwrap(), config);
}

#[test]
fn test_invalid_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{not json").unwrap();

    assert!(matches!(ClientConfig::load(&path), Err(crate::Error::Config(_))));
}
