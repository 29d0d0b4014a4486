//! Loading configuration files from disk and building an orchestrator from them.

use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use discern::config::{load_config, load_config_or_default, CacheBackend};
use discern::{ConfigError, DiscernError, Orchestrator, PipelineKind, SourceType};

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_yaml_file() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        r#"
version: "1.0"
api:
  base_url: https://analysis.example.com
cache:
  backend: memory
  memory_capacity: 16
"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.api.base_url, "https://analysis.example.com");
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.cache.memory_capacity, 16);
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    match load_config(&path) {
        Err(ConfigError::ReadFile { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a read error, got {:?}", other.map(|_| ())),
    }
    let config = load_config_or_default(&path).unwrap();
    assert_eq!(config.version, "1.0");
}

#[test]
fn test_orchestrator_from_memory_config() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.json",
        r#"{ "version": "1.0", "cache": { "backend": "memory" }, "events": { "capacity": 8 } }"#,
    );
    let config = load_config(&path).unwrap();

    let orch = Orchestrator::from_config(&config).unwrap();
    orch.set_content_item(discern::ContentItem::document("doc", SourceType::Text, "t"));
    assert_eq!(orch.available_pipelines().len(), 5);
    assert!(orch.select(PipelineKind::Summary));
}

#[test]
#[serial]
fn test_api_key_from_file_and_env() {
    let dir = TempDir::new().unwrap();
    let key_path = write(&dir, "key", "sk-test\n");
    let config_path = write(
        &dir,
        "with-key.json",
        &format!(
            r#"{{ "version": "1.0", "api": {{ "api_key_file": "{}" }} }}"#,
            key_path.display()
        ),
    );
    let config = load_config(&config_path).unwrap();
    assert!(Orchestrator::from_config(&config).is_ok());

    std::env::remove_var("DISCERN_TEST_MISSING_KEY");
    let config_path = write(
        &dir,
        "missing-env.json",
        r#"{ "version": "1.0", "api": { "api_key_env_var": "DISCERN_TEST_MISSING_KEY" } }"#,
    );
    let config = load_config(&config_path).unwrap();
    assert!(matches!(
        Orchestrator::from_config(&config),
        Err(DiscernError::Secret(_))
    ));
}
