//! In-process execution units backed by dedicated OS threads.
//!
//! Each unit owns one thread that:
//!
//! 1. sends `ready` as soon as it starts,
//! 2. blocks on its inbox (no polling) and runs each job request through the
//!    shared [`JobRegistry`],
//! 3. reports request-level problems (`UnknownJob`, malformed requests) as
//!    `error` messages, and handler panics as a unit fault, after which the
//!    thread exits and the manager replaces it.
//!
//! Terminating a unit drops its inbox sender; the thread exits once the job it
//! is running, if any, returns.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::core::protocol::{Envelope, FailureKind, UnitMessage};
use crate::core::registry::{JobRegistry, Outbox};
use crate::core::unit::{ExecutionUnit, UnitEvents, UnitFactory, UnitId};
use crate::core::PoolError;

/// Default stack size for unit threads (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Factory producing [`ThreadUnit`]s that share one [`JobRegistry`].
#[derive(Debug, Clone)]
pub struct ThreadUnitFactory {
    registry: Arc<JobRegistry>,
    stack_size: usize,
}

impl ThreadUnitFactory {
    /// Create a factory whose units run jobs from `registry`.
    #[must_use]
    pub const fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Set the stack size of unit threads.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// The registry shared by every unit from this factory.
    #[must_use]
    pub const fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }
}

impl UnitFactory for ThreadUnitFactory {
    type Unit = ThreadUnit;

    fn spawn(&self, id: &UnitId, location: &str, events: UnitEvents) -> Result<ThreadUnit, PoolError> {
        let (inbox_tx, inbox_rx) = unbounded::<Envelope>();
        let registry = Arc::clone(&self.registry);
        let unit = id.clone();

        let handle = thread::Builder::new()
            .name(format!("wp-{id}"))
            .stack_size(self.stack_size)
            .spawn(move || run_unit(&unit, &inbox_rx, &registry, &events))
            .map_err(|e| PoolError::Spawn {
                unit: id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(unit = %id, location, "unit thread spawned");
        Ok(ThreadUnit {
            id: id.clone(),
            inbox: Some(inbox_tx),
            thread: Some(handle),
        })
    }
}

/// A unit running on its own OS thread.
#[derive(Debug)]
pub struct ThreadUnit {
    id: UnitId,
    inbox: Option<Sender<Envelope>>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadUnit {
    /// Whether the unit thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl ExecutionUnit for ThreadUnit {
    fn send(&mut self, envelope: Envelope) -> Result<(), PoolError> {
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| PoolError::Transport(format!("unit {} has been terminated", self.id)))?;
        inbox
            .send(envelope)
            .map_err(|_| PoolError::Transport(format!("unit {} thread has exited", self.id)))
    }

    fn terminate(&mut self) -> Result<(), PoolError> {
        // Dropping the sender ends the thread's recv loop. The thread is not
        // joined: a hung handler must not block the manager.
        if self.inbox.take().is_none() {
            return Err(PoolError::Transport(format!("unit {} already terminated", self.id)));
        }
        self.thread.take();
        debug!(unit = %self.id, "unit terminated");
        Ok(())
    }
}

/// Body of a unit thread.
fn run_unit(unit: &UnitId, inbox: &Receiver<Envelope>, registry: &JobRegistry, events: &UnitEvents) {
    if events.send(UnitMessage::Ready).is_err() {
        debug!(unit = %unit, "manager gone before unit became ready");
        return;
    }

    let outbox: Arc<dyn Outbox> = Arc::new(events.clone());

    // Blocking recv: the thread sleeps until a job arrives or the inbox closes.
    while let Ok(envelope) = inbox.recv() {
        let job_name = envelope.tag().unwrap_or("<none>").to_owned();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.on_job_request(envelope, Arc::clone(&outbox))
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(unit = %unit, job = %job_name, error = %err, "rejecting job request");
                let (error, kind) = match err {
                    PoolError::UnknownJob(name) => (Value::String(name), FailureKind::UnknownJob),
                    other => (Value::String(other.to_string()), FailureKind::Protocol),
                };
                if events.send(UnitMessage::Error { error, kind }).is_err() {
                    break;
                }
            }
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!(unit = %unit, job = %job_name, %reason, "job handler panicked");
                let _ = events.fault(format!("job `{job_name}` panicked: {reason}"));
                return;
            }
        }
    }

    debug!(unit = %unit, "unit inbox closed, thread exiting");
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
