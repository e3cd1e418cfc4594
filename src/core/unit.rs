//! Execution unit abstraction: the transport seam between manager and units.
//!
//! The manager never creates threads or processes itself. It asks a
//! [`UnitFactory`] for an [`ExecutionUnit`] and hands the factory a
//! [`UnitEvents`] handle; the unit uses that handle to deliver inbound messages
//! and to signal transport-level faults.
//!
//! [`ThreadUnitFactory`] is the in-process host: one dedicated OS thread per
//! unit, running a [`JobRegistry`](crate::core::JobRegistry).

mod threaded;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::protocol::{Envelope, UnitMessage};
use crate::core::registry::Outbox;
use crate::core::PoolError;

pub use threaded::{ThreadUnit, ThreadUnitFactory, DEFAULT_STACK_SIZE};

/// Identifier of a unit within its pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Create an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the `index`-th unit created at construction.
    #[must_use]
    pub fn indexed(prefix: &str, index: usize) -> Self {
        Self(format!("{prefix}_{index}"))
    }

    /// Id given to the unit that replaces this one after a fault.
    #[must_use]
    pub fn replacement(&self) -> Self {
        Self(format!("{}.replaced", self.0))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle state of a unit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Spawned, waiting for its `ready` message.
    Starting,
    /// Ready for a job.
    Idle,
    /// Running a job.
    Busy,
    /// Faulted; about to be (or failed to be) replaced.
    Error,
}

/// Inbound traffic from units, tagged with the sending unit.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    Message { unit: UnitId, envelope: Envelope },
    Fault { unit: UnitId, reason: String },
}

/// Channel a unit uses to reach its manager.
///
/// Cloneable and `Send`, so a unit may report from any thread. Every call
/// fails with `PoolError::PoolShutdown` once the manager has stopped.
#[derive(Clone)]
pub struct UnitEvents {
    unit: UnitId,
    tx: mpsc::UnboundedSender<UnitEvent>,
}

impl UnitEvents {
    pub(crate) const fn new(unit: UnitId, tx: mpsc::UnboundedSender<UnitEvent>) -> Self {
        Self { unit, tx }
    }

    /// Id of the unit this handle reports for.
    #[must_use]
    pub const fn unit_id(&self) -> &UnitId {
        &self.unit
    }

    /// Deliver a raw wire message to the manager.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` if the manager has stopped.
    pub fn message(&self, envelope: Envelope) -> Result<(), PoolError> {
        self.tx
            .send(UnitEvent::Message {
                unit: self.unit.clone(),
                envelope,
            })
            .map_err(|_| PoolError::PoolShutdown)
    }

    /// Deliver a typed message to the manager.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` if the manager has stopped.
    pub fn send(&self, message: UnitMessage) -> Result<(), PoolError> {
        self.message(message.encode())
    }

    /// Report a transport-level failure of this unit.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::PoolShutdown` if the manager has stopped.
    pub fn fault(&self, reason: impl Into<String>) -> Result<(), PoolError> {
        self.tx
            .send(UnitEvent::Fault {
                unit: self.unit.clone(),
                reason: reason.into(),
            })
            .map_err(|_| PoolError::PoolShutdown)
    }
}

impl Outbox for UnitEvents {
    fn post(&self, message: UnitMessage) -> Result<(), PoolError> {
        self.send(message)
    }

    fn fault(&self, reason: String) -> Result<(), PoolError> {
        Self::fault(self, reason)
    }
}

impl fmt::Debug for UnitEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitEvents").field("unit", &self.unit).finish_non_exhaustive()
    }
}

/// A running execution unit as seen by the manager.
pub trait ExecutionUnit: Send + 'static {
    /// Deliver a job request to the unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit can no longer receive messages; the
    /// manager treats this as a fault of the unit.
    fn send(&mut self, envelope: Envelope) -> Result<(), PoolError>;

    /// Stop the unit. Called at most once per fault and on shutdown.
    ///
    /// # Errors
    ///
    /// Failures are logged by the manager and never propagated.
    fn terminate(&mut self) -> Result<(), PoolError>;
}

/// Creates execution units for a pool.
pub trait UnitFactory: Send + 'static {
    /// Unit type produced by this factory.
    type Unit: ExecutionUnit;

    /// Spawn a unit with the given id. `location` is the opaque unit
    /// location from the manager configuration (a script path, a model
    /// name, ...). The unit must send `ready` through `events` once it can
    /// accept a job.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Spawn` if the unit cannot be created.
    fn spawn(&self, id: &UnitId, location: &str, events: UnitEvents) -> Result<Self::Unit, PoolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ids() {
        let id = UnitId::indexed("unit", 3);
        assert_eq!(id.as_str(), "unit_3");
        assert_eq!(id.replacement().to_string(), "unit_3.replaced");
        assert_eq!(id.replacement().replacement().as_str(), "unit_3.replaced.replaced");
    }

    #[tokio::test]
    async fn test_events_are_tagged_with_unit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = UnitEvents::new(UnitId::from("unit_0"), tx);

        events.send(UnitMessage::Ready).unwrap();
        events.fault("boom").unwrap();

        match rx.recv().await {
            Some(UnitEvent::Message { unit, envelope }) => {
                assert_eq!(unit.as_str(), "unit_0");
                assert_eq!(envelope.tag(), Some("ready"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await {
            Some(UnitEvent::Fault { unit, reason }) => {
                assert_eq!(unit.as_str(), "unit_0");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_events_fail_after_manager_stops() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let events = UnitEvents::new(UnitId::from("unit_0"), tx);
        assert_eq!(events.send(UnitMessage::Ready), Err(PoolError::PoolShutdown));
    }
}
