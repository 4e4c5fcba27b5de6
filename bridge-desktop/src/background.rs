//! Task dispatch on the Tokio runtime.

use bridge_traits::{
    background::{TaskDispatcher, TaskFactory, TaskId, TaskStatus},
    error::{BridgeError, Result},
};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type TaskTable = Arc<Mutex<HashMap<TaskId, TaskInfo>>>;

/// Tokio-based task dispatcher for desktop.
///
/// One-off tasks are spawned onto the current runtime. Recurring tasks run on
/// a `tokio::time::interval`; the first run happens one full interval after
/// scheduling.
pub struct TokioTaskDispatcher {
    handle: Option<Handle>,
    tasks: TaskTable,
}

struct TaskInfo {
    status: TaskStatus,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl TokioTaskDispatcher {
    /// Create a dispatcher bound to the runtime active at call time, if any.
    pub fn new() -> Self {
        Self {
            handle: Handle::try_current().ok(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a dispatcher that spawns onto an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| {
                BridgeError::NotAvailable("No Tokio runtime available for dispatch".to_string())
            }),
        }
    }

    fn lock(tasks: &TaskTable) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskInfo>> {
        tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(tasks: &TaskTable, id: &TaskId, status: TaskStatus) {
        if let Some(info) = Self::lock(tasks).get_mut(id) {
            info.status = status;
        }
    }

    async fn run_recurring_task(
        tasks: TaskTable,
        id: TaskId,
        factory: TaskFactory,
        period: Duration,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(period);
        // interval fires immediately on the first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    Self::set_status(&tasks, &id, TaskStatus::Cancelled);
                    break;
                }
                _ = ticker.tick() => {
                    Self::set_status(&tasks, &id, TaskStatus::Running);
                    debug!(task_id = %id, "Running recurring task");
                    factory().await;
                    Self::set_status(&tasks, &id, TaskStatus::Scheduled);
                }
            }
        }
    }
}

impl Default for TokioTaskDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDispatcher for TokioTaskDispatcher {
    fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<()> {
        let runtime = self.runtime()?;
        runtime.spawn(task);
        Ok(())
    }

    fn schedule_recurring(
        &self,
        task_id: &str,
        interval: Duration,
        factory: TaskFactory,
    ) -> Result<TaskId> {
        if interval.is_zero() {
            return Err(BridgeError::OperationFailed(
                "Recurring interval must be greater than zero".to_string(),
            ));
        }

        let runtime = self.runtime()?;
        let id = TaskId::new(task_id);

        // Replacing a schedule cancels the previous one first
        self.cancel(&id)?;

        debug!(
            task_id = task_id,
            interval_secs = interval.as_secs(),
            "Scheduling recurring task"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let tasks = Arc::clone(&self.tasks);

        {
            let mut table = Self::lock(&self.tasks);
            table.insert(
                id.clone(),
                TaskInfo {
                    status: TaskStatus::Scheduled,
                    handle: None,
                    cancel: Some(cancel_tx),
                },
            );
        }

        let handle = runtime.spawn(Self::run_recurring_task(
            tasks,
            id.clone(),
            factory,
            interval,
            cancel_rx,
        ));

        if let Some(info) = Self::lock(&self.tasks).get_mut(&id) {
            info.handle = Some(handle);
        }

        Ok(id)
    }

    fn cancel(&self, task_id: &TaskId) -> Result<()> {
        let mut table = Self::lock(&self.tasks);
        if let Some(info) = table.get_mut(task_id) {
            if let Some(cancel) = info.cancel.take() {
                if cancel.send(()).is_err() {
                    warn!(task_id = %task_id, "Recurring task already stopped");
                }
            }
            if let Some(handle) = info.handle.take() {
                // The loop may be mid-run; abort so a cancelled schedule never fires again.
                handle.abort();
            }
            info.status = TaskStatus::Cancelled;
            debug!(task_id = %task_id, "Cancelled recurring task");
        }
        Ok(())
    }

    fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        Self::lock(&self.tasks).get(task_id).map(|info| info.status)
    }
}
