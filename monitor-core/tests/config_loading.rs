use monitor_core::{ConfigError, ConfigSource, RunConfig, StorageBackend};
use std::io::Write;
use tempfile::{Builder, TempDir};

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::load(dir.path().join("absent.json")).unwrap();

    assert_eq!(config.search_terms, vec!["ralph lauren".to_string()]);
    assert_eq!(config.channel_id, 0);
    assert_eq!(config.refresh_delay, 3);
    assert_eq!(config.max_images_per_post, 4);
    assert_eq!(config.country_filter, "Deutschland");
    assert_eq!(config.storage.backend, StorageBackend::Json);
}

#[test]
fn load_reports_where_the_config_came_from() {
    let dir = TempDir::new().unwrap();
    let absent = dir.path().join("absent.json");
    let (_, source) = RunConfig::load_with_source(&absent).unwrap();
    assert_eq!(source, ConfigSource::Defaults(absent));

    let path = write_config(&dir, "config.json", r#"{"search_terms": ["polo"]}"#);
    let (config, source) = RunConfig::load_with_source(&path).unwrap();
    assert_eq!(source, ConfigSource::File(path));
    assert_eq!(config.search_terms, vec!["polo".to_string()]);
}

#[test]
fn reads_plain_json_layout() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.json",
        r#"{
            "token": "bot-token",
            "channel_id": 123456789012345678,
            "search_terms": ["nike", "carhartt"],
            "refresh_delay": 10
        }"#,
    );

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.channel_id, 123456789012345678);
    assert_eq!(config.search_terms, vec!["nike", "carhartt"]);
    assert_eq!(config.poll_interval().as_secs(), 10);
    assert_eq!(config.max_images_per_post, 4);
    assert_eq!(config.marketplace.host, "www.vinted.de");
}

#[test]
fn reads_toml_with_nested_sections() {
    let dir = Builder::new().prefix("vinted-config").tempdir().unwrap();
    let path = write_config(
        &dir,
        "monitor.toml",
        r#"
channel_id = 42
search_terms = ["levis"]
max_images_per_post = 1
country_filter = "Frankreich"

[storage]
backend = "sqlite"
path = "sqlite://seen.db"

[logging]
level = "debug"
"#,
    );

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.max_images_per_post, 1);
    assert_eq!(config.country_filter, "Frankreich");
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.storage.path, "sqlite://seen.db");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.logging.file.as_deref(),
        Some("vinted_monitor.log")
    );
}

#[test]
fn rejects_invalid_image_cap() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"max_images_per_post": 0}"#);

    let err = RunConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_images_per_post"));
}

#[test]
fn rejects_blank_search_terms() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", r#"{"search_terms": ["  "]}"#);

    assert!(matches!(
        RunConfig::load(&path),
        Err(ConfigError::ValidationFailed { .. })
    ));
}

#[test]
fn malformed_json_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", "{ not json");

    assert!(matches!(
        RunConfig::load(&path),
        Err(ConfigError::InvalidFormat { .. })
    ));
}
