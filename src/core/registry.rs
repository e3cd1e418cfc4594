//! Unit-side job registry.
//!
//! A [`JobRegistry`] maps job names to handlers. When a job request reaches a
//! unit, the registry looks up the handler and runs it with the request params
//! and a [`JobContext`] through which the handler streams progress and reports
//! exactly one terminal outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::core::protocol::{Envelope, FailureKind, JobRequest, UnitMessage};
use crate::core::PoolError;

/// Destination for messages a unit sends back to its manager.
pub trait Outbox: Send + Sync {
    /// Post a message to the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager can no longer be reached.
    fn post(&self, message: UnitMessage) -> Result<(), PoolError>;

    /// Report that the unit can no longer run its current job.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager can no longer be reached.
    fn fault(&self, reason: String) -> Result<(), PoolError>;
}

/// A job implementation that can be registered under a name.
///
/// Implemented for every `Fn(Value, JobContext)` closure, so most callers
/// register closures directly.
pub trait JobHandler: Send + Sync + 'static {
    /// Run the job. The handler must finish the job through `ctx`, either
    /// before returning or later from another thread that owns `ctx`.
    fn run(&self, params: Value, ctx: JobContext);
}

impl<F> JobHandler for F
where
    F: Fn(Value, JobContext) + Send + Sync + 'static,
{
    fn run(&self, params: Value, ctx: JobContext) {
        self(params, ctx);
    }
}

/// Reason sent when a handler lets its context go without an outcome.
pub const NO_OUTCOME_ERROR: &str = "job handler returned without an outcome";

/// Per-job channel back to the manager.
///
/// `complete` and `fail` consume the context, so a handler can report at
/// most one terminal outcome. Dropping the context without either reports
/// [`NO_OUTCOME_ERROR`] as a job failure.
///
/// A context dropped while its thread unwinds from a panic faults the unit.
/// On the thread that created the context the unit host already reports the
/// panic, so only contexts moved to other threads send the fault themselves.
pub struct JobContext {
    job_name: String,
    outbox: Arc<dyn Outbox>,
    origin: ThreadId,
    settled: bool,
}

impl JobContext {
    /// Create a context for one run of `job_name`.
    pub fn new(job_name: impl Into<String>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            job_name: job_name.into(),
            outbox,
            origin: thread::current().id(),
            settled: false,
        }
    }

    /// Name of the job being run.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Report that `current` out of `total` units of work are done.
    ///
    /// May be called any number of times before the job finishes. Values
    /// that do not form a ratio in `[0, 1]` are logged and dropped.
    pub fn report_progress(&self, current: u64, total: u64) {
        match UnitMessage::progress_steps(current, total) {
            Ok(message) => self.post(message),
            Err(err) => warn!(job = %self.job_name, error = %err, "dropping invalid progress report"),
        }
    }

    /// Finish the job successfully with `payload`.
    pub fn complete(mut self, payload: Value) {
        self.settled = true;
        self.post(UnitMessage::Complete { payload });
    }

    /// Finish the job with an application-level failure.
    pub fn fail(mut self, error: impl Into<Value>) {
        self.settled = true;
        self.post(UnitMessage::Error {
            error: error.into(),
            kind: FailureKind::Job,
        });
    }

    fn post(&self, message: UnitMessage) {
        if let Err(err) = self.outbox.post(message) {
            debug!(job = %self.job_name, error = %err, "manager unreachable, dropping job message");
        }
    }
}

impl Drop for JobContext {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if thread::panicking() {
            let current = thread::current();
            if current.id() == self.origin {
                return;
            }
            let reason = format!(
                "job `{}` abandoned by panicking thread `{}`",
                self.job_name,
                current.name().unwrap_or("<unnamed>")
            );
            error!(job = %self.job_name, %reason, "job context dropped during panic");
            if let Err(err) = self.outbox.fault(reason) {
                debug!(job = %self.job_name, error = %err, "manager unreachable, dropping fault");
            }
            return;
        }
        warn!(job = %self.job_name, "job context dropped without an outcome");
        self.post(UnitMessage::Error {
            error: Value::String(NO_OUTCOME_ERROR.into()),
            kind: FailureKind::Job,
        });
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_name", &self.job_name)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

/// Named job handlers available to a unit.
///
/// Registration takes `&self` so a registry shared between several units can
/// still gain jobs after the units are running.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, silently replacing any earlier handler.
    pub fn register_job<H: JobHandler>(&self, name: impl Into<String>, handler: H) {
        let name = name.into();
        if self.jobs.write().insert(name.clone(), Arc::new(handler)).is_some() {
            debug!(job = %name, "replaced registered job handler");
        }
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.read().contains_key(name)
    }

    /// Names of all registered jobs, sorted.
    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the handler for an incoming job request.
    ///
    /// # Errors
    ///
    /// - `PoolError::Protocol` if the request carries no job name
    /// - `PoolError::UnknownJob` if no handler is registered under that name
    pub fn on_job_request(&self, envelope: Envelope, outbox: Arc<dyn Outbox>) -> Result<(), PoolError> {
        let request = JobRequest::decode(envelope)?;
        // Clone the handler out so the lock is not held while the job runs.
        let handler = self
            .jobs
            .read()
            .get(&request.job_name)
            .cloned()
            .ok_or_else(|| PoolError::UnknownJob(request.job_name.clone()))?;

        debug!(job = %request.job_name, "running job handler");
        let ctx = JobContext::new(request.job_name, outbox);
        handler.run(request.params, ctx);
        Ok(())
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.job_names())
            .finish()
    }
}
