//! Unit tests for configuration loading and root folder resolution
//!
//! Tests that manipulate TPNG_ROOT_FOLDER or TPNG_CONFIG are marked with
//! #[serial] so they never race on process environment.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tpng_common::config::{
    CompiledDefaults, QueueFullPolicy, RootFolderInitializer, RootFolderResolver, TomlConfig,
    CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.bind_addr.contains(':'));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    let toml = TomlConfig::parse(r#"root_folder = "/tmp/tpng-from-toml""#).unwrap();

    env::remove_var(ROOT_FOLDER_ENV);
    let from_toml = RootFolderResolver::new("test").with_toml(&toml).resolve();
    assert_eq!(from_toml, PathBuf::from("/tmp/tpng-from-toml"));

    env::set_var(ROOT_FOLDER_ENV, "/tmp/tpng-from-env");
    let from_env = RootFolderResolver::new("test").with_toml(&toml).resolve();
    assert_eq!(from_env, PathBuf::from("/tmp/tpng-from-env"));

    let from_cli = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/tpng-from-cli")))
        .with_toml(&toml)
        .resolve();
    assert_eq!(from_cli, PathBuf::from("/tmp/tpng-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_toml_defaults_when_tables_missing() {
    let config = TomlConfig::parse("").unwrap();

    assert!(config.root_folder.is_none());
    assert!(config.apprise_api_url.is_none());
    assert_eq!(config.dispatch.workers, 8);
    assert_eq!(config.dispatch.queue_capacity, 1024);
    assert_eq!(config.dispatch.queue_full, QueueFullPolicy::Block);
    assert_eq!(config.dispatch.job_timeout_secs, 10);
    assert!(config.pruner.enabled);
    assert_eq!(config.pruner.interval_hours, 24);
}

#[test]
fn test_toml_full_document() {
    let config = TomlConfig::parse(
        r#"
        root_folder = "/srv/tpng"
        bind_addr = "0.0.0.0:8080"
        apprise_api_url = "http://apprise:8000"
        broadcast_capacity = 256

        [logging]
        level = "debug"

        [dispatch]
        workers = 2
        queue_capacity = 16
        queue_full = "shed"
        job_timeout_secs = 3

        [pruner]
        enabled = false
        interval_hours = 6
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/tpng")));
    assert_eq!(config.bind_addr.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(config.apprise_api_url.as_deref(), Some("http://apprise:8000"));
    assert_eq!(config.broadcast_capacity, Some(256));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.dispatch.workers, 2);
    assert_eq!(config.dispatch.queue_full, QueueFullPolicy::Shed);
    assert!(!config.pruner.enabled);
    assert_eq!(config.pruner.interval_hours, 6);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = TomlConfig::parse("dispatch = [").unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
#[serial]
fn test_load_or_default_survives_missing_file() {
    env::remove_var(CONFIG_FILE_ENV);
    let missing = PathBuf::from("/nonexistent/tpng/config.toml");

    let config = TomlConfig::load_or_default(Some(&missing));

    assert!(config.root_folder.is_none());
    assert_eq!(config.dispatch.workers, 8);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[pruner]\ninterval_hours = 12\n").unwrap();

    let config = TomlConfig::load_or_default(Some(&path));

    assert_eq!(config.pruner.interval_hours, 12);
}

#[test]
fn test_queue_full_policy_from_str() {
    assert_eq!("block".parse::<QueueFullPolicy>().unwrap(), QueueFullPolicy::Block);
    assert_eq!(" SHED ".parse::<QueueFullPolicy>().unwrap(), QueueFullPolicy::Shed);
    assert!("drop".parse::<QueueFullPolicy>().is_err());
}

#[test]
fn test_initializer_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.audio_path().is_dir());
    assert_eq!(initializer.database_path(), root.join("tpng.db"));
}
