use super::*;

#[test]
fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str("name: test_project").unwrap();
    assert_eq!(config.name, "test_project");
    assert_eq!(config.migrations_path, "migrations");
    assert_eq!(config.database.path, ":memory:");
    assert_eq!(config.database.db_type, DbType::DuckDb);
    assert_eq!(config.ledger, LedgerConfig::default());
    assert_eq!(config.lock.timeout_ms, 30_000);
    assert_eq!(config.lock.poll_interval_ms, 250);
    config.validate().unwrap();
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
name: eco_monitoring
migrations_path: db/migrations
database:
  type: duckdb
  path: target/dev.duckdb
ledger:
  schema: ops
  table: applied_migrations
  lock_table: applied_lock
lock:
  timeout_ms: 500
  poll_interval_ms: 50
targets:
  prod:
    database:
      path: /var/lib/eco/prod.duckdb
  staging: {}
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.migrations_path, "db/migrations");
    assert_eq!(config.ledger.schema, "ops");
    assert_eq!(config.ledger.table, "applied_migrations");
    assert_eq!(config.lock.timeout(), std::time::Duration::from_millis(500));
    assert_eq!(config.available_targets(), vec!["prod", "staging"]);

    let prod = config.get_database_config(Some("prod")).unwrap();
    assert_eq!(prod.path, "/var/lib/eco/prod.duckdb");

    // staging has no database override and falls back to the base config
    let staging = config.get_database_config(Some("staging")).unwrap();
    assert_eq!(staging.path, "target/dev.duckdb");
}

#[test]
fn test_unknown_target_lists_available() {
    let yaml = r#"
name: test
targets:
  prod: {}
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let err = config.get_database_config(Some("qa")).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("[E003]"));
    assert!(msg.contains("qa"));
    assert!(msg.contains("prod"));
}

#[test]
fn test_unknown_fields_rejected() {
    let result: Result<Config, _> = serde_yaml::from_str("name: test\nmodel_paths: [models]");
    assert!(result.is_err());

    let result: Result<Config, _> =
        serde_yaml::from_str("name: test\nledger:\n  database: other");
    assert!(result.is_err());
}

#[test]
fn test_validate_rejects_bad_identifiers() {
    let mut config: Config = serde_yaml::from_str("name: test").unwrap();
    config.ledger.table = "ledger; DROP TABLE users".to_string();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));

    let mut config: Config = serde_yaml::from_str("name: test").unwrap();
    config.ledger.schema = "1abc".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_same_ledger_and_lock_table() {
    let mut config: Config = serde_yaml::from_str("name: test").unwrap();
    config.ledger.lock_table = config.ledger.table.clone();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_zero_poll_interval() {
    let config: Config =
        serde_yaml::from_str("name: test\nlock:\n  poll_interval_ms: 0").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_name() {
    let config: Config = serde_yaml::from_str("name: ''").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_is_valid_identifier() {
    assert!(is_valid_identifier("shale"));
    assert!(is_valid_identifier("_ledger_2"));
    assert!(!is_valid_identifier(""));
    assert!(!is_valid_identifier("9lives"));
    assert!(!is_valid_identifier("a.b"));
    assert!(!is_valid_identifier("a-b"));
}

#[test]
fn test_load_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("shale.yml"), "name: from_disk\n").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.name, "from_disk");
}

#[test]
fn test_load_from_dir_yaml_extension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("shale.yaml"), "name: yaml_ext\n").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.name, "yaml_ext");
}

#[test]
fn test_load_from_dir_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_load_reports_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shale.yml");
    std::fs::write(&path, "name: [unclosed\n").unwrap();
    let err = Config::load(&path).unwrap_err();
    match err {
        CoreError::ConfigParseError { path: p, .. } => assert!(p.ends_with("shale.yml")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_migrations_path_absolute() {
    let config: Config = serde_yaml::from_str("name: test").unwrap();
    let root = std::path::PathBuf::from("/srv/app");
    assert_eq!(
        config.migrations_path_absolute(&root),
        root.join("migrations")
    );
}

// These tests modify environment variables and must run serially
use serial_test::serial;

fn with_env<F: FnOnce()>(key: &str, value: Option<&str>, body: F) {
    let original = std::env::var(key).ok();
    match value {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
    body();
    match original {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
}

#[test]
#[serial]
fn test_resolve_target_cli_takes_precedence() {
    with_env(TARGET_ENV_VAR, Some("staging"), || {
        assert_eq!(Config::resolve_target(Some("prod")), Some("prod".to_string()));
    });
}

#[test]
#[serial]
fn test_resolve_target_uses_env_var() {
    with_env(TARGET_ENV_VAR, Some("staging"), || {
        assert_eq!(Config::resolve_target(None), Some("staging".to_string()));
    });
}

#[test]
#[serial]
fn test_resolve_target_none_when_not_set() {
    with_env(TARGET_ENV_VAR, None, || {
        assert_eq!(Config::resolve_target(None), None);
    });
}

#[test]
#[serial]
fn test_resolve_database_url_relative_path_anchored_at_root() {
    let config: Config =
        serde_yaml::from_str("name: test\ndatabase:\n  path: target/dev.duckdb").unwrap();
    let root = std::path::PathBuf::from("/srv/app");
    with_env(DATABASE_URL_ENV_VAR, None, || {
        let url = config.resolve_database_url(&root, None, None).unwrap();
        assert_eq!(url, root.join("target/dev.duckdb").display().to_string());
    });
}

#[test]
#[serial]
fn test_resolve_database_url_keeps_memory_and_absolute() {
    let root = std::path::PathBuf::from("/srv/app");
    with_env(DATABASE_URL_ENV_VAR, None, || {
        let config: Config = serde_yaml::from_str("name: test").unwrap();
        assert_eq!(
            config.resolve_database_url(&root, None, None).unwrap(),
            ":memory:"
        );

        let config: Config = serde_yaml::from_str(
            "name: test\ndatabase:\n  path: duckdb:///var/lib/app.duckdb",
        )
        .unwrap();
        assert_eq!(
            config.resolve_database_url(&root, None, None).unwrap(),
            "duckdb:///var/lib/app.duckdb"
        );

        let config: Config =
            serde_yaml::from_str("name: test\ndatabase:\n  path: duckdb://rel.duckdb").unwrap();
        assert_eq!(
            config.resolve_database_url(&root, None, None).unwrap(),
            format!("duckdb://{}", root.join("rel.duckdb").display())
        );
    });
}

#[test]
#[serial]
fn test_resolve_database_url_precedence() {
    let yaml = r#"
name: test
database:
  path: base.duckdb
targets:
  prod:
    database:
      path: /data/prod.duckdb
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let root = std::path::PathBuf::from("/srv/app");

    with_env(DATABASE_URL_ENV_VAR, Some("/from/env.duckdb"), || {
        // Explicit URL beats the environment
        assert_eq!(
            config
                .resolve_database_url(&root, Some("/explicit.duckdb"), Some("prod"))
                .unwrap(),
            "/explicit.duckdb"
        );
        // Environment beats the named target
        assert_eq!(
            config.resolve_database_url(&root, None, Some("prod")).unwrap(),
            "/from/env.duckdb"
        );
    });

    with_env(DATABASE_URL_ENV_VAR, None, || {
        assert_eq!(
            config.resolve_database_url(&root, None, Some("prod")).unwrap(),
            "/data/prod.duckdb"
        );
    });
}
