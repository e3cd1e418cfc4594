//! Caller-facing job handle and the manager-side record that settles it.
//!
//! A submitted job is represented by two halves created together:
//!
//! - [`JobHandle`] stays with the caller. It is a `Future` resolving to the
//!   job's single terminal outcome and also exposes the progress stream.
//! - `JobRecord` travels with the request through the queue into the
//!   manager's in-flight table and is consumed exactly once when the job
//!   settles, which closes the progress stream.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::core::protocol::JobRequest;
use crate::core::PoolError;

/// Unique identifier of a submitted job, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(uuid::Uuid);

impl JobId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome of a job.
pub type JobOutcome = Result<Value, PoolError>;

/// Handle to a submitted job.
///
/// Await the handle to get the job's result. Progress ratios in `[0, 1]` can be
/// read with [`JobHandle::next_progress`] before awaiting; the progress stream
/// ends when the job settles.
///
/// ```rust,ignore
/// let mut job = manager.submit_job("resize", Some(json!({"width": 640})))?;
/// while let Some(ratio) = job.next_progress().await {
///     tracing::info!(ratio, "resize progress");
/// }
/// let output = job.await?;
/// ```
#[must_use = "a job handle does nothing unless awaited"]
pub struct JobHandle {
    id: JobId,
    job_name: String,
    progress: mpsc::UnboundedReceiver<f64>,
    /// `None` once the outcome has been returned.
    outcome: Option<oneshot::Receiver<JobOutcome>>,
}

impl JobHandle {
    /// Id assigned to this job at submission.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Name of the job that was submitted.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Wait for the next progress ratio.
    ///
    /// Returns `None` once the job has settled and every ratio reported before
    /// settling has been consumed.
    pub async fn next_progress(&mut self) -> Option<f64> {
        self.progress.recv().await
    }

    /// Take a progress ratio that has already arrived, without waiting.
    pub fn try_progress(&mut self) -> Option<f64> {
        self.progress.try_recv().ok()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("job_name", &self.job_name)
            .finish_non_exhaustive()
    }
}

/// Polling again after the outcome was returned yields
/// `PoolError::InvalidArgument` instead of panicking.
impl Future for JobHandle {
    type Output = JobOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(outcome) = this.outcome.as_mut() else {
            return Poll::Ready(Err(PoolError::InvalidArgument(format!(
                "outcome of job {} was already taken",
                this.id
            ))));
        };
        // A dropped sender means the manager went away without settling.
        let ready = std::task::ready!(Pin::new(outcome).poll(cx));
        this.outcome = None;
        Poll::Ready(ready.unwrap_or(Err(PoolError::PoolShutdown)))
    }
}

/// Manager-side hooks for one job: progress notification and settlement.
pub(crate) struct JobRecord {
    pub(crate) id: JobId,
    pub(crate) job_name: String,
    progress: mpsc::UnboundedSender<f64>,
    outcome: oneshot::Sender<JobOutcome>,
}

impl JobRecord {
    /// Forward a progress ratio to the caller. A caller that stopped
    /// listening is not an error.
    pub(crate) fn notify(&self, ratio: f64) {
        let _ = self.progress.send(ratio);
    }

    /// Deliver the terminal outcome. Consuming `self` makes a second
    /// settlement impossible and closes the progress stream.
    pub(crate) fn settle(self, outcome: JobOutcome) {
        if self.outcome.send(outcome).is_err() {
            tracing::debug!(job_id = %self.id, job = %self.job_name, "job handle dropped before settlement");
        }
    }
}

/// A job waiting for a unit: the request plus the hooks that settle it.
pub(crate) struct PendingJob {
    pub(crate) request: JobRequest,
    pub(crate) record: JobRecord,
}

/// Create the linked caller handle and pending job for a request.
pub(crate) fn job_pair(request: JobRequest) -> (JobHandle, PendingJob) {
    let id = JobId::new();
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let handle = JobHandle {
        id,
        job_name: request.job_name.clone(),
        progress: progress_rx,
        outcome: Some(outcome_rx),
    };
    let record = JobRecord {
        id,
        job_name: request.job_name.clone(),
        progress: progress_tx,
        outcome: outcome_tx,
    };
    (handle, PendingJob { request, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_progress_then_outcome() {
        let (mut handle, pending) = job_pair(JobRequest::new("count", None));
        assert_eq!(handle.job_name(), "count");

        pending.record.notify(0.25);
        pending.record.notify(0.5);
        pending.record.settle(Ok(json!("done")));

        assert_eq!(handle.next_progress().await, Some(0.25));
        assert_eq!(handle.next_progress().await, Some(0.5));
        assert_eq!(handle.next_progress().await, None);
        assert_eq!(handle.await, Ok(json!("done")));
    }

    #[tokio::test]
    async fn test_dropped_record_reports_shutdown() {
        let (handle, pending) = job_pair(JobRequest::new("lost", None));
        drop(pending);
        assert_eq!(handle.await, Err(PoolError::PoolShutdown));
    }

    #[test]
    fn test_settle_after_handle_dropped() {
        let (handle, pending) = job_pair(JobRequest::new("orphan", None));
        drop(handle);
        pending.record.notify(1.0);
        pending.record.settle(Ok(json!(null)));
    }

    #[tokio::test]
    async fn test_polling_after_outcome_does_not_panic() {
        let (mut handle, pending) = job_pair(JobRequest::new("once", None));
        pending.record.settle(Ok(json!(1)));

        assert_eq!((&mut handle).await, Ok(json!(1)));
        assert!(matches!((&mut handle).await, Err(PoolError::InvalidArgument(_))));
    }
}
