use riskgraph_core::{ConfigError, ConfigManager, RiskGraphConfig};
use tempfile::TempDir;

#[test]
fn default_config_file_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&path).unwrap();
    assert!(path.exists());

    let manager = ConfigManager::load_from(&path).unwrap();
    assert_eq!(manager.config_path(), Some(path.as_path()));

    let defaults = RiskGraphConfig::default();
    let loaded = manager.config();
    assert_eq!(loaded.graph.max_visits, defaults.graph.max_visits);
    assert_eq!(
        loaded.clustering.default_strategy,
        defaults.clustering.default_strategy
    );
    assert_eq!(
        loaded.retention.max_node_age_secs,
        defaults.retention.max_node_age_secs
    );
}

#[test]
fn missing_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    let err = ConfigManager::load_from(&tmp.path().join("absent.toml"))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.toml");
    std::fs::write(&path, "[graph\nmax_visits = ").unwrap();

    let err = ConfigManager::load_from(&path).err().unwrap();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn invalid_values_fail_validation() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("invalid.toml");
    std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

    let err = ConfigManager::load_from(&path).err().unwrap();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}
