//! # Prometheus Worker Pool
//!
//! A fixed-size, self-healing pool of execution units that run named jobs.
//!
//! A [`PoolManager`](core::PoolManager) owns a set of units, hands each
//! submitted job to an idle unit (or parks it in a FIFO queue until one frees
//! up), relays progress reports back to the submitter, and settles the job's
//! handle with exactly one outcome. When a unit faults, its in-flight job is
//! rejected and a replacement unit takes its slot, so the pool size never
//! shrinks.
//!
//! On the unit side, a [`JobRegistry`](core::JobRegistry) maps job names to
//! handlers. Handlers report through a [`JobContext`](core::JobContext):
//! any number of progress reports, then one `complete` or `fail`.
//!
//! Units and manager talk through a small tagged JSON protocol
//! ([`Envelope`](core::Envelope)), so units can live on threads (the bundled
//! [`ThreadUnitFactory`](core::ThreadUnitFactory)) or behind any other
//! transport implementing [`UnitFactory`](core::UnitFactory).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use prometheus_worker_pool::builders::PoolManagerBuilder;
//! use prometheus_worker_pool::config::ManagerConfig;
//! use prometheus_worker_pool::core::{JobContext, JobRegistry};
//! use serde_json::{json, Value};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(JobRegistry::new());
//! registry.register_job("double", |params: Value, ctx: JobContext| {
//!     let n = params["n"].as_i64().unwrap_or_default();
//!     ctx.report_progress(1, 1);
//!     ctx.complete(json!(n * 2));
//! });
//!
//! let manager = PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(4))
//!     .build_threaded(registry)?;
//!
//! let mut job = manager.submit_job("double", Some(json!({"n": 21})))?;
//! while let Some(ratio) = job.next_progress().await {
//!     println!("progress: {ratio:.2}");
//! }
//! assert_eq!(job.await?, json!(42));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pool abstractions: protocol, units, registry, and the manager.
pub mod core;
/// Configuration models for the pool manager.
pub mod config;
/// Builders to construct pool managers from configuration.
pub mod builders;
/// Runtime adapters hosting the manager's event loop.
pub mod runtime;
/// Shared utilities.
pub mod util;
