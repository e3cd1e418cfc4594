//! Tests for builder modules

use std::sync::Arc;

use prometheus_worker_pool::builders::PoolManagerBuilder;
use prometheus_worker_pool::config::ManagerConfig;
use prometheus_worker_pool::core::{JobContext, JobRegistry, PoolError, UnitStatus};
use prometheus_worker_pool::runtime::TokioSpawner;
use serde_json::{json, Value};

#[test]
fn test_builder_keeps_config() {
    let builder = PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(3).with_unit_id_prefix("w"));
    assert_eq!(builder.config().pool_size, 3);
    assert_eq!(builder.config().unit_id_prefix, "w");
}

#[tokio::test]
async fn test_build_threaded_uses_prefix() {
    let registry = Arc::new(JobRegistry::new());
    registry.register_job("ping", |_: Value, ctx: JobContext| ctx.complete(json!("pong")));

    let manager = PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(2).with_unit_id_prefix("w"))
        .build_threaded(registry)
        .expect("Failed to build manager");
    assert_eq!(manager.pool_size(), 2);

    let job = manager.submit_job("ping", None).expect("Failed to submit job");
    assert_eq!(job.await, Ok(json!("pong")));

    let snapshot = manager.snapshot().await.expect("Failed to take snapshot");
    let ids: Vec<_> = snapshot.units.iter().map(|u| u.id.to_string()).collect();
    assert_eq!(ids, vec!["w_0", "w_1"]);
    assert!(snapshot.units.iter().all(|u| u.status != UnitStatus::Error));
}

#[test]
fn test_build_with_spawner_outside_async_context() {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let spawner = TokioSpawner::new(runtime.handle().clone());
    let registry = Arc::new(JobRegistry::new());
    registry.register_job("ping", |_: Value, ctx: JobContext| ctx.complete(json!("pong")));

    let manager = PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(1))
        .build_with_spawner(
            prometheus_worker_pool::core::ThreadUnitFactory::new(registry),
            &spawner,
        )
        .expect("Failed to build manager");

    let job = manager.submit_job("ping", None).expect("Failed to submit job");
    assert_eq!(runtime.block_on(job), Ok(json!("pong")));
}

#[tokio::test]
async fn test_build_rejects_zero_units() {
    let result = PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(0))
        .build_threaded(Arc::new(JobRegistry::new()));
    assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
}
