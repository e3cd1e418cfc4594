//! Error types for pool manager, unit host, and job registry operations.

use thiserror::Error;

/// Errors produced by the pool manager and the unit-side job registry.
///
/// Recoverable kinds (`Protocol`, `UnknownJob`, `Job`) only ever affect the
/// message or job that raised them. `Fault` is recovered by replacing the
/// unit. `NotFound` and `DuplicateId` mean an internal invariant is broken.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    /// Caller supplied an unusable argument (e.g. an empty job name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A malformed or unrecognized message crossed the unit boundary.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The unit has no handler registered under the requested job name.
    #[error("unknown job: {0}")]
    UnknownJob(String),
    /// The job handler reported a failure through `fail`.
    #[error("job failed: {0}")]
    Job(serde_json::Value),
    /// The execution unit running the job failed at the transport level.
    #[error("unit {unit} faulted: {reason}")]
    Fault {
        /// Id of the unit that faulted.
        unit: String,
        /// Transport-provided description of the fault.
        reason: String,
    },
    /// No unit with this id is in the pool.
    #[error("no unit found with id {0}")]
    NotFound(String),
    /// More than one unit shares this id.
    #[error("more than one unit has id {0}")]
    DuplicateId(String),
    /// The unit factory could not create an execution unit.
    #[error("failed to spawn unit {unit}: {reason}")]
    Spawn {
        /// Id the new unit would have had.
        unit: String,
        /// Factory-provided description of the failure.
        reason: String,
    },
    /// A message could not be delivered to or from a unit.
    #[error("transport error: {0}")]
    Transport(String),
    /// The manager has been shut down.
    #[error("pool manager has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Whether this error leaves the pool and other queued work untouched.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::Protocol(_) | Self::UnknownJob(_) | Self::Job(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
