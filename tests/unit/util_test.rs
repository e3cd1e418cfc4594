//! Tests for utility functions

use prometheus_worker_pool::util::{init_tracing, init_tracing_with_default, DEFAULT_LOG_DIRECTIVE};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    init_tracing_with_default("debug");
    assert!(tracing::dispatcher::has_been_set());
}

#[test]
fn test_default_directive_targets_crate() {
    assert!(DEFAULT_LOG_DIRECTIVE.starts_with("prometheus_worker_pool"));
}
