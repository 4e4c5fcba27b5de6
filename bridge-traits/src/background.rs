//! Background Execution and Task Dispatch
//!
//! Lets the core move sync and fetch work off the caller's context without
//! knowing which runtime or thread pool the host uses.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Factory producing a fresh future for each run of a recurring task
pub type TaskFactory = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is scheduled but not yet running
    Scheduled,
    /// Task is currently executing
    Running,
    /// Task was cancelled
    Cancelled,
}

/// Task dispatch facility
///
/// Abstracts the host's worker pool:
/// - **Desktop**: Tokio runtime
/// - **Android**: app executor service
///
/// Results never flow back through the dispatcher. Callers hand the task a
/// channel sender and decide themselves how to marshal the value back to the
/// context that owns them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::TaskDispatcher;
/// use futures::FutureExt;
///
/// fn kick_off(dispatcher: &dyn TaskDispatcher) -> Result<()> {
///     let (tx, rx) = tokio::sync::oneshot::channel();
///     dispatcher.dispatch(async move { let _ = tx.send(42); }.boxed())?;
///     Ok(())
/// }
/// ```
pub trait TaskDispatcher: Send + Sync {
    /// Run a one-off task in the background
    fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<()>;

    /// Run `factory()` every `interval` until the task is cancelled.
    ///
    /// Scheduling a task id that is already active replaces the old schedule.
    fn schedule_recurring(
        &self,
        task_id: &str,
        interval: Duration,
        factory: TaskFactory,
    ) -> Result<TaskId>;

    /// Cancel a recurring task. Unknown ids are ignored.
    fn cancel(&self, task_id: &TaskId) -> Result<()>;

    /// Current status of a recurring task, `None` if unknown
    fn status(&self, task_id: &TaskId) -> Option<TaskStatus>;
}
