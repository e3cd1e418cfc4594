//! Core pool abstractions: wire protocol, units, job registry, and the manager.

pub mod error;
pub mod job;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod unit;

pub use error::{AppResult, PoolError};
pub use job::{JobHandle, JobId, JobOutcome};
pub use manager::{PoolManager, PoolSnapshot, PoolStats, UnitSnapshot};
pub use protocol::{Envelope, FailureKind, JobRequest, UnitMessage};
pub use registry::{JobContext, JobHandler, JobRegistry, Outbox, NO_OUTCOME_ERROR};
pub use unit::{
    ExecutionUnit, ThreadUnit, ThreadUnitFactory, UnitEvents, UnitFactory, UnitId, UnitStatus,
    DEFAULT_STACK_SIZE,
};
