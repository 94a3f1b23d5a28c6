//! Unit tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate ENRICH_ROOT_FOLDER are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use enrich_common::config::{
    load_toml_config, CompiledDefaults, LoggingConfig, RootFolderInitializer, RootFolderResolver,
    ROOT_FOLDER_ENV,
};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SampleConfig {
    root_folder: Option<PathBuf>,
    logging: LoggingConfig,
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
    assert!(defaults.root_folder.to_string_lossy().contains("enrich"));
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
fn test_resolver_env_var_overrides_config_file() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/enrich-test-env-folder");

    let root_folder = RootFolderResolver::new("test-module")
        .with_config_root(Some(PathBuf::from("/tmp/from-toml")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/enrich-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_arg_takes_precedence() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/enrich-priority-2");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/enrich-priority-1")))
        .with_config_root(Some(PathBuf::from("/tmp/enrich-priority-3")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/enrich-priority-1"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_uses_config_root_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module")
        .with_config_root(Some(PathBuf::from("/srv/enrich")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/srv/enrich"));
}

#[test]
fn test_initializer_creates_directory_idempotently() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(initializer.ensure_directory_exists().is_ok());

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("enrich.db"));
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let config: SampleConfig = load_toml_config(&missing).unwrap();

    assert!(config.root_folder.is_none());
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [not valid").unwrap();

    let result: enrich_common::Result<SampleConfig> = load_toml_config(&path);

    assert!(matches!(result, Err(enrich_common::Error::Config(_))));
}

#[test]
fn test_partial_config_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.toml");
    std::fs::write(&path, "root_folder = \"/data/enrich\"\n").unwrap();

    let config: SampleConfig = load_toml_config(&path).unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/data/enrich")));
    assert_eq!(config.logging.level, "info");
}
