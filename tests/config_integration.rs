//! Config persistence and location resolution

use serial_test::serial;
use std::path::Path;
use tracescope_rs::config::{resolve_config_path, AnalysisConfig, CONFIG_ENV};

fn customized() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.source_label = "nightly".to_string();
    config.monitoring.host_name = "build-agent".to_string();
    config.filter.not_before = Some(1_000);
    config.reconstruction.emit_invalid_traces = true;
    config.signatures.component_script = Some("component.to_upper()".to_string());
    config
}

#[test]
fn test_save_and_load_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("analysis.toml");
    let config = customized();
    config.save(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[monitoring]"));
    assert_eq!(AnalysisConfig::load(&path).unwrap(), config);
}

#[test]
fn test_save_and_load_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.json");
    let config = customized();
    config.save(&path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["source_label"], "nightly");
    assert_eq!(AnalysisConfig::load(&path).unwrap(), config);
}

#[test]
fn test_unparsable_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "source_label = [").unwrap();
    assert!(AnalysisConfig::load(&path).is_err());
    assert_eq!(
        AnalysisConfig::load_or_default(Some(&path)),
        AnalysisConfig::default()
    );
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("from_env.toml");
    customized().save(&path).unwrap();

    std::env::set_var(CONFIG_ENV, &path);
    let resolved = resolve_config_path(None);
    let loaded = AnalysisConfig::load_or_default(None);
    let explicit = resolve_config_path(Some(Path::new("explicit.toml")));
    std::env::remove_var(CONFIG_ENV);

    assert_eq!(resolved.as_deref(), Some(path.as_path()));
    assert_eq!(loaded.source_label, "nightly");
    assert_eq!(explicit.as_deref(), Some(Path::new("explicit.toml")));
}
