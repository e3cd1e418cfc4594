//! Pool manager: owns the units, the FIFO wait queue, and the in-flight jobs.
//!
//! # Design
//!
//! The manager is an actor. [`PoolManager`] is a cheap, cloneable handle that
//! only sends commands; a single task spawned at construction owns all mutable
//! state (pool, queue, job table) and processes two mailboxes one item at a
//! time:
//!
//! - **commands** from handles (submit, snapshot, shutdown)
//! - **events** from units (wire messages and transport faults)
//!
//! Unit events are polled first so that a snapshot taken after a unit reported
//! something always reflects it. Nothing in the actor blocks: acquisition and
//! completion are continuations resumed by later events.
//!
//! # Scheduling
//!
//! Strict FIFO among queued jobs. A job that finds an idle unit at submission
//! takes it immediately; the queue only holds jobs while no unit is idle.
//! When a job settles, the freed unit is handed straight to the head of the
//! queue without rescanning the pool.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::core::job::{job_pair, JobHandle, JobOutcome, JobRecord, PendingJob};
use crate::core::protocol::{Envelope, FailureKind, JobRequest, UnitMessage};
use crate::core::unit::{ExecutionUnit, UnitEvent, UnitEvents, UnitFactory, UnitId, UnitStatus};
use crate::core::PoolError;
use crate::runtime::{Spawn, TokioSpawner};

/// Counters describing pool activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of units in the pool.
    pub pool_size: usize,
    /// Jobs accepted by the manager.
    pub submitted_jobs: u64,
    /// Jobs resolved with a payload.
    pub completed_jobs: u64,
    /// Jobs rejected (job errors, unknown jobs, faults).
    pub failed_jobs: u64,
    /// Transport faults reported by units.
    pub unit_faults: u64,
    /// Replacement units spawned after faults.
    pub unit_replacements: u64,
}

/// Point-in-time view of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSnapshot {
    /// Unit id.
    pub id: UnitId,
    /// Unit status.
    pub status: UnitStatus,
}

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    /// Units in pool order.
    pub units: Vec<UnitSnapshot>,
    /// Jobs waiting for a unit.
    pub queued_jobs: usize,
    /// Jobs currently running on a unit.
    pub in_flight_jobs: usize,
    /// Activity counters.
    pub stats: PoolStats,
}

impl PoolSnapshot {
    /// Number of units with the given status.
    #[must_use]
    pub fn count(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }

    /// Status of the unit with the given id, if present.
    #[must_use]
    pub fn status_of(&self, id: &str) -> Option<UnitStatus> {
        self.units.iter().find(|u| u.id.as_str() == id).map(|u| u.status)
    }
}

enum Command {
    Submit(PendingJob),
    Snapshot(oneshot::Sender<PoolSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running pool manager.
///
/// Clones share the same manager. When every handle is dropped the manager
/// shuts down: units are terminated and pending jobs are rejected with
/// `PoolError::PoolShutdown`.
#[derive(Clone)]
pub struct PoolManager {
    commands: mpsc::UnboundedSender<Command>,
    pool_size: usize,
}

impl PoolManager {
    /// Create a manager on the current tokio runtime and spawn its units.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidArgument` if `pool_size` is 0
    /// - `PoolError::InvalidConfig` if the configuration is otherwise invalid
    ///   or no tokio runtime is running
    /// - `PoolError::Spawn` if the factory fails to create a unit
    pub fn new<F: UnitFactory>(config: ManagerConfig, factory: F) -> Result<Self, PoolError> {
        let spawner = TokioSpawner::try_current().ok_or_else(|| {
            PoolError::InvalidConfig("PoolManager::new must be called within a tokio runtime".into())
        })?;
        Self::with_spawner(config, factory, &spawner)
    }

    /// Create a manager whose event loop runs on `spawner`.
    ///
    /// All `config.pool_size` units are spawned before this returns, each in
    /// `Starting` state until it sends `ready`.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidArgument` if `pool_size` is 0
    /// - `PoolError::InvalidConfig` if the configuration is otherwise invalid
    /// - `PoolError::Spawn` if the factory fails to create a unit; units
    ///   already created are terminated
    pub fn with_spawner<F, S>(config: ManagerConfig, factory: F, spawner: &S) -> Result<Self, PoolError>
    where
        F: UnitFactory,
        S: Spawn,
    {
        if config.pool_size == 0 {
            return Err(PoolError::InvalidArgument("pool_size must be greater than 0".into()));
        }
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut state = ManagerState::new(factory, &config, event_tx);

        for index in 0..config.pool_size {
            let id = UnitId::indexed(&config.unit_id_prefix, index);
            match state.spawn_unit(&id) {
                Ok(handle) => state.pool.push(UnitRecord::starting(id, handle)),
                Err(err) => {
                    error!(unit = %id, error = %err, "failed to spawn unit, aborting construction");
                    state.shutdown();
                    return Err(err);
                }
            }
        }

        info!(
            pool_size = config.pool_size,
            location = %config.location,
            "pool manager started"
        );
        spawner.spawn(state.run(command_rx, event_rx));

        Ok(Self {
            commands: command_tx,
            pool_size: config.pool_size,
        })
    }

    /// Submit a job by name. `params` defaults to an empty object.
    ///
    /// The returned handle resolves once the job reaches its terminal
    /// outcome, and streams progress ratios before that.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidArgument` if `name` is empty
    /// - `PoolError::PoolShutdown` if the manager has stopped
    pub fn submit_job(&self, name: &str, params: Option<Value>) -> Result<JobHandle, PoolError> {
        if name.is_empty() {
            return Err(PoolError::InvalidArgument(
                "the name of the job to execute is required".into(),
            ));
        }

        let (handle, pending) = job_pair(JobRequest::new(name, params));
        self.commands
            .send(Command::Submit(pending))
            .map_err(|_| PoolError::PoolShutdown)?;
        Ok(handle)
    }

    /// Take a snapshot of unit statuses, queue depth, and counters.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` if the manager has stopped.
    pub async fn snapshot(&self) -> Result<PoolSnapshot, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| PoolError::PoolShutdown)?;
        rx.await.map_err(|_| PoolError::PoolShutdown)
    }

    /// Stop the manager: terminate all units and reject every in-flight and
    /// queued job with `PoolError::PoolShutdown`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` if the manager had already stopped.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(tx))
            .map_err(|_| PoolError::PoolShutdown)?;
        rx.await.map_err(|_| PoolError::PoolShutdown)
    }

    /// Number of units in the pool.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether the manager's event loop has stopped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pool_size", &self.pool_size)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

struct UnitRecord<U> {
    id: UnitId,
    handle: U,
    status: UnitStatus,
}

impl<U> UnitRecord<U> {
    const fn starting(id: UnitId, handle: U) -> Self {
        Self {
            id,
            handle,
            status: UnitStatus::Starting,
        }
    }
}

/// State owned by the actor task.
struct ManagerState<F: UnitFactory> {
    factory: F,
    location: String,
    pool: Vec<UnitRecord<F::Unit>>,
    queue: VecDeque<PendingJob>,
    /// In-flight jobs keyed by the unit running them.
    jobs: HashMap<UnitId, JobRecord>,
    events: mpsc::UnboundedSender<UnitEvent>,
    stats: PoolStats,
}

impl<F: UnitFactory> ManagerState<F> {
    fn new(factory: F, config: &ManagerConfig, events: mpsc::UnboundedSender<UnitEvent>) -> Self {
        Self {
            factory,
            location: config.location.clone(),
            pool: Vec::with_capacity(config.pool_size),
            queue: VecDeque::new(),
            jobs: HashMap::with_capacity(config.pool_size),
            events,
            stats: PoolStats {
                pool_size: config.pool_size,
                ..PoolStats::default()
            },
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<UnitEvent>,
    ) {
        loop {
            let command = tokio::select! {
                biased;

                // Never closes: `self.events` keeps a sender alive.
                Some(event) = events.recv() => {
                    self.handle_event(event);
                    continue;
                }
                command = commands.recv() => command,
            };

            match command {
                Some(Command::Submit(job)) => {
                    self.stats.submitted_jobs += 1;
                    self.acquire_unit(job);
                }
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(self.snapshot());
                }
                Some(Command::Shutdown(reply)) => {
                    // Refuse new submissions before acknowledging.
                    commands.close();
                    self.shutdown();
                    let _ = reply.send(());
                    break;
                }
                None => {
                    debug!("all pool manager handles dropped");
                    self.shutdown();
                    break;
                }
            }
        }
        info!("pool manager stopped");
    }

    fn handle_event(&mut self, event: UnitEvent) {
        let (unit, result) = match event {
            UnitEvent::Message { unit, envelope } => {
                let result = self.on_unit_message(&unit, envelope);
                (unit, result)
            }
            UnitEvent::Fault { unit, reason } => {
                let result = self.on_unit_fault(&unit, &reason);
                (unit, result)
            }
        };

        match result {
            Ok(()) => {}
            Err(PoolError::NotFound(_)) if self.was_replaced(&unit) => {
                warn!(unit = %unit, "ignoring event from replaced unit");
            }
            Err(err @ (PoolError::NotFound(_) | PoolError::DuplicateId(_))) => {
                error!(unit = %unit, error = %err, "unit id invariant violated");
            }
            Err(err) => warn!(unit = %unit, error = %err, "dropping unit message"),
        }
    }

    /// Hand `job` to the first idle unit in pool order, or queue it.
    fn acquire_unit(&mut self, job: PendingJob) {
        match self.pool.iter().position(|u| u.status == UnitStatus::Idle) {
            Some(index) => self.dispatch(index, job),
            None => {
                debug!(
                    job = %job.record.job_name,
                    job_id = %job.record.id,
                    queued = self.queue.len() + 1,
                    "no idle unit, job queued"
                );
                self.queue.push_back(job);
            }
        }
    }

    fn dispatch(&mut self, index: usize, job: PendingJob) {
        let PendingJob { request, record } = job;
        let unit = &mut self.pool[index];
        let id = unit.id.clone();
        unit.status = UnitStatus::Busy;
        debug!(unit = %id, job = %request.job_name, job_id = %record.id, "dispatching job");

        let previous = self.jobs.insert(id.clone(), record);
        debug_assert!(previous.is_none(), "unit {id} already had an in-flight job");

        if let Err(err) = unit.handle.send(request.encode()) {
            warn!(unit = %id, error = %err, "job delivery failed, treating unit as faulted");
            if let Err(err) = self.on_unit_fault(&id, &err.to_string()) {
                error!(unit = %id, error = %err, "failed to recover unit after delivery failure");
            }
        }
    }

    /// Mark the unit idle and relay it to the next queued job, if any.
    fn release_unit(&mut self, index: usize) {
        self.pool[index].status = UnitStatus::Idle;
        if let Some(job) = self.queue.pop_front() {
            debug!(unit = %self.pool[index].id, job = %job.record.job_name, "relaying freed unit to queued job");
            self.dispatch(index, job);
        }
    }

    fn on_unit_message(&mut self, id: &UnitId, envelope: Envelope) -> Result<(), PoolError> {
        let index = self.lookup_unit(id)?;
        match UnitMessage::decode(envelope)? {
            UnitMessage::Ready => {
                let status = self.pool[index].status;
                if status == UnitStatus::Busy {
                    return Err(PoolError::Protocol(format!(
                        "unit {id} sent ready while running a job"
                    )));
                }
                info!(unit = %id, previous = ?status, "unit ready");
                self.release_unit(index);
            }
            UnitMessage::Progress { current, total } => {
                let job = self.jobs.get(id).ok_or_else(|| {
                    PoolError::Protocol(format!("unit {id} reported progress with no active job"))
                })?;
                job.notify(progress_ratio(current, total));
            }
            UnitMessage::Complete { payload } => self.settle(index, Ok(payload))?,
            UnitMessage::Error { error, kind } => {
                let err = match kind {
                    FailureKind::Job => PoolError::Job(error),
                    FailureKind::UnknownJob => PoolError::UnknownJob(value_text(error)),
                    FailureKind::Protocol => PoolError::Protocol(value_text(error)),
                };
                self.settle(index, Err(err))?;
            }
        }
        Ok(())
    }

    /// Deliver a terminal outcome, then free the unit.
    fn settle(&mut self, index: usize, outcome: JobOutcome) -> Result<(), PoolError> {
        let id = self.pool[index].id.clone();
        let record = self.jobs.remove(&id).ok_or_else(|| {
            PoolError::Protocol(format!("unit {id} reported an outcome with no active job"))
        })?;

        match &outcome {
            Ok(_) => {
                self.stats.completed_jobs += 1;
                debug!(unit = %id, job = %record.job_name, job_id = %record.id, "job completed");
            }
            Err(err) => {
                self.stats.failed_jobs += 1;
                debug!(unit = %id, job = %record.job_name, job_id = %record.id, error = %err, "job failed");
            }
        }

        record.settle(outcome);
        self.release_unit(index);
        Ok(())
    }

    fn on_unit_fault(&mut self, id: &UnitId, reason: &str) -> Result<(), PoolError> {
        let index = self.lookup_unit(id)?;
        self.stats.unit_faults += 1;
        warn!(unit = %id, %reason, "unit faulted");

        let unit = &mut self.pool[index];
        unit.status = UnitStatus::Error;
        if let Err(err) = unit.handle.terminate() {
            error!(unit = %id, error = %err, "problem terminating faulted unit");
        }

        if let Some(record) = self.jobs.remove(id) {
            warn!(unit = %id, job = %record.job_name, job_id = %record.id, "rejecting job of faulted unit");
            self.stats.failed_jobs += 1;
            record.settle(Err(PoolError::Fault {
                unit: id.to_string(),
                reason: reason.to_owned(),
            }));
        }

        let replacement = id.replacement();
        match self.spawn_unit(&replacement) {
            Ok(handle) => {
                info!(unit = %id, replacement = %replacement, "spawned replacement unit");
                self.pool[index] = UnitRecord::starting(replacement, handle);
                self.stats.unit_replacements += 1;
            }
            Err(err) => {
                error!(unit = %id, error = %err, "failed to spawn replacement, unit stays in error state");
            }
        }
        Ok(())
    }

    /// Index of the unit with `id`.
    fn lookup_unit(&self, id: &UnitId) -> Result<usize, PoolError> {
        let mut matches = self
            .pool
            .iter()
            .enumerate()
            .filter(|(_, unit)| &unit.id == id)
            .map(|(index, _)| index);

        match (matches.next(), matches.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(PoolError::NotFound(id.to_string())),
            (Some(_), Some(_)) => Err(PoolError::DuplicateId(id.to_string())),
        }
    }

    /// Whether `id` left the pool through fault replacement.
    fn was_replaced(&self, id: &UnitId) -> bool {
        let successor = id.replacement();
        self.pool
            .iter()
            .any(|u| u.id.as_str().starts_with(successor.as_str()))
    }

    fn spawn_unit(&self, id: &UnitId) -> Result<F::Unit, PoolError> {
        let events = UnitEvents::new(id.clone(), self.events.clone());
        self.factory.spawn(id, &self.location, events)
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            units: self
                .pool
                .iter()
                .map(|u| UnitSnapshot {
                    id: u.id.clone(),
                    status: u.status,
                })
                .collect(),
            queued_jobs: self.queue.len(),
            in_flight_jobs: self.jobs.len(),
            stats: self.stats.clone(),
        }
    }

    fn shutdown(&mut self) {
        info!(
            in_flight = self.jobs.len(),
            queued = self.queue.len(),
            "shutting down pool manager"
        );
        for (_, record) in self.jobs.drain() {
            record.settle(Err(PoolError::PoolShutdown));
        }
        for job in self.queue.drain(..) {
            job.record.settle(Err(PoolError::PoolShutdown));
        }
        for unit in &mut self.pool {
            if unit.status == UnitStatus::Error {
                continue;
            }
            if let Err(err) = unit.handle.terminate() {
                warn!(unit = %unit.id, error = %err, "problem terminating unit during shutdown");
            }
            unit.status = UnitStatus::Error;
        }
    }
}

fn progress_ratio(current: f64, total: f64) -> f64 {
    (current / total).clamp(0.0, 1.0)
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
