//! Tests for config file loading and resolution against real files

use ptk_common::config::{
    ConfigOverrides, ConfigSource, ServerConfig, TomlConfig, DEFAULT_LOG_LEVEL, DEFAULT_PORT,
};
use ptk_common::Error;
use std::io::Write;
use std::path::PathBuf;

const SECRET: &str = "file-secret-file-secret-file-secret";

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_full_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!(
            r#"
port = 6100
bind = "0.0.0.0"
database = "/srv/ptk/ptk.db"
jwt_secret = "{}"
coach_cutoff = "2025-09-01T00:00:00Z"
log_level = "debug"
"#,
            SECRET
        ),
    );

    let (file, source) = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(source, ConfigSource::File(path.clone()));
    assert_eq!(file.port, Some(6100));
    assert_eq!(file.database, Some(PathBuf::from("/srv/ptk/ptk.db")));

    let config = ServerConfig::resolve(ConfigOverrides::default(), file).unwrap();
    assert_eq!(config.listen_addr(), "0.0.0.0:6100");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.jwt_secret, SECRET);
    assert_eq!(config.coach_cutoff.to_rfc3339(), "2025-09-01T00:00:00+00:00");
}

#[test]
fn test_partial_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, &format!("jwt_secret = \"{}\"\n", SECRET));

    let file = TomlConfig::load(&path).unwrap();
    let config = ServerConfig::resolve(ConfigOverrides::default(), file).unwrap();
    assert_eq!(config.port, DEFAULT_PORT);
}

#[test]
fn test_command_line_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, &format!("port = 6100\njwt_secret = \"{}\"\n", SECRET));

    let overrides = ConfigOverrides {
        port: Some(6200),
        database: Some(dir.path().join("override.db")),
        ..Default::default()
    };
    let config = ServerConfig::resolve(overrides, TomlConfig::load(&path).unwrap()).unwrap();
    assert_eq!(config.port, 6200);
    assert_eq!(config.database, dir.path().join("override.db"));
}

#[test]
fn test_log_level_resolves_before_subscriber_install() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!("log_level = \"warn\"\njwt_secret = \"{}\"\n", SECRET),
    );

    let (file, source) = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(source.to_string(), format!("config file {}", path.display()));
    let from_file = ServerConfig::resolve(ConfigOverrides::default(), file.clone()).unwrap();
    assert_eq!(from_file.log_level, "warn");

    let overrides = ConfigOverrides {
        log_level: Some("trace".to_string()),
        ..Default::default()
    };
    assert_eq!(ServerConfig::resolve(overrides, file).unwrap().log_level, "trace");

    let bare = TomlConfig {
        jwt_secret: Some(SECRET.to_string()),
        ..Default::default()
    };
    let defaulted = ServerConfig::resolve(ConfigOverrides::default(), bare).unwrap();
    assert_eq!(defaulted.log_level, DEFAULT_LOG_LEVEL);
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TomlConfig::load_or_default(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_invalid_file_reports_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let unknown_key = write_config(&dir, "root_folder = \"/music\"\n");
    assert!(matches!(TomlConfig::load(&unknown_key), Err(Error::Config(_))));

    let bad_type = write_config(&dir, "port = \"eighty\"\n");
    assert!(matches!(TomlConfig::load(&bad_type), Err(Error::Config(_))));
}

#[test]
fn test_invalid_cutoff_in_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!("jwt_secret = \"{}\"\ncoach_cutoff = \"yesterday\"\n", SECRET),
    );
    let result = ServerConfig::resolve(ConfigOverrides::default(), TomlConfig::load(&path).unwrap());
    assert!(matches!(result, Err(Error::Config(_))));
}
