//! Tests for error types

use prometheus_worker_pool::core::PoolError;
use serde_json::json;

#[test]
fn test_invalid_argument_error() {
    let err = PoolError::InvalidArgument("empty job name".to_string());
    assert_eq!(format!("{}", err), "invalid argument: empty job name");
    assert!(err.is_recoverable());
}

#[test]
fn test_fault_error() {
    let err = PoolError::Fault {
        unit: "unit_0".to_string(),
        reason: "pipe closed".to_string(),
    };
    assert_eq!(format!("{}", err), "unit unit_0 faulted: pipe closed");
    assert!(!err.is_recoverable());
}

#[test]
fn test_job_error_carries_payload() {
    let err = PoolError::Job(json!({"code": 7}));
    assert_eq!(format!("{}", err), r#"job failed: {"code":7}"#);
    assert!(err.is_recoverable());
}

#[test]
fn test_lookup_errors_are_not_recoverable() {
    assert!(!PoolError::NotFound("unit_9".to_string()).is_recoverable());
    assert!(!PoolError::DuplicateId("unit_1".to_string()).is_recoverable());
    assert_eq!(
        format!("{}", PoolError::NotFound("unit_9".to_string())),
        "no unit found with id unit_9"
    );
}

#[test]
fn test_shutdown_error() {
    let err = PoolError::PoolShutdown;
    assert_eq!(format!("{}", err), "pool manager has been shut down");
}
