//! Tests for configuration validation and loading

use prometheus_worker_pool::config::manager::{ENV_ID_PREFIX, ENV_LOCATION, ENV_POOL_SIZE, ENV_STACK_SIZE};
use prometheus_worker_pool::config::ManagerConfig;
use prometheus_worker_pool::core::DEFAULT_STACK_SIZE;

#[test]
fn test_manager_config_defaults() {
    let config = ManagerConfig::default();
    assert_eq!(config.pool_size, 2);
    assert_eq!(config.location, "in-process");
    assert_eq!(config.unit_id_prefix, "unit");
    assert_eq!(config.thread_stack_size, DEFAULT_STACK_SIZE);
    assert!(config.validate().is_ok());
}

#[test]
fn test_manager_config_invalid_pool_size() {
    let invalid = ManagerConfig::new().with_pool_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_manager_config_invalid_prefix() {
    let invalid = ManagerConfig::new().with_unit_id_prefix("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_manager_config_invalid_stack_size() {
    let invalid = ManagerConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_manager_config_from_json() {
    let json = r#"{ "pool_size": 4, "location": "scripts/worker.js" }"#;
    let config = ManagerConfig::from_json_str(json).expect("Failed to parse config");
    assert_eq!(config.pool_size, 4);
    assert_eq!(config.location, "scripts/worker.js");
    assert_eq!(config.unit_id_prefix, "unit");
}

#[test]
fn test_manager_config_from_json_rejects_invalid() {
    assert!(ManagerConfig::from_json_str(r#"{ "pool_size": 0 }"#).is_err());
    assert!(ManagerConfig::from_json_str("not json").is_err());
}

// Single test so the process-wide environment is not raced.
#[test]
fn test_manager_config_from_env() {
    std::env::set_var(ENV_POOL_SIZE, "6");
    std::env::set_var(ENV_LOCATION, "gpu-host");
    std::env::set_var(ENV_ID_PREFIX, "gpu");
    std::env::set_var(ENV_STACK_SIZE, "1048576");

    let config = ManagerConfig::from_env().expect("Failed to load config from env");
    assert_eq!(config.pool_size, 6);
    assert_eq!(config.location, "gpu-host");
    assert_eq!(config.unit_id_prefix, "gpu");
    assert_eq!(config.thread_stack_size, 1_048_576);

    std::env::set_var(ENV_POOL_SIZE, "many");
    let err = ManagerConfig::from_env().expect_err("Unparsable pool size should fail");
    assert!(err.to_string().contains(ENV_POOL_SIZE));

    std::env::set_var(ENV_POOL_SIZE, "0");
    assert!(ManagerConfig::from_env().is_err());

    for var in [ENV_POOL_SIZE, ENV_LOCATION, ENV_ID_PREFIX, ENV_STACK_SIZE] {
        std::env::remove_var(var);
    }
}
