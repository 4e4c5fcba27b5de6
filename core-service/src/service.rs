//! # Sync Service
//!
//! Explicitly constructed façade over the sync orchestrator. The host owns
//! one instance per process and hands it to whatever needs to sync.
//!
//! Besides forwarding the orchestrator operations, the service owns
//! configuration edits and the recurring auto-sync schedule.

use bridge_traits::{
    background::{TaskDispatcher, TaskFactory, TaskId, TaskStatus},
    storage::SettingsStore,
};
use core_runtime::config::{auto_sync_enabled, SyncConfig, SyncInterval};
use core_sync::{ExecutionMode, SyncOrchestrator, SyncState, SyncTicket, TestResult};
use futures::FutureExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::CoreDependencies;

/// Task id of the recurring history sync
pub const AUTO_SYNC_TASK_ID: &str = "history_auto_sync";

pub struct SyncService {
    orchestrator: SyncOrchestrator,
    settings: Arc<dyn SettingsStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    auto_sync: Mutex<Option<TaskId>>,
}

impl SyncService {
    pub fn new(deps: CoreDependencies) -> Self {
        let settings = Arc::clone(&deps.settings_store);
        let dispatcher = Arc::clone(&deps.dispatcher);
        Self {
            orchestrator: SyncOrchestrator::new(deps.into_orchestrator_deps()),
            settings,
            dispatcher,
            auto_sync: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> SyncState {
        self.orchestrator.state()
    }

    pub async fn is_configured(&self) -> bool {
        self.orchestrator.is_configured().await
    }

    /// Validate, persist and activate a configuration.
    ///
    /// Returns whether the active backend changed.
    #[instrument(skip_all, fields(mode = %config.mode()))]
    pub async fn configure(&self, config: &SyncConfig) -> Result<bool> {
        config.validate()?;
        let previous = self.orchestrator.current_config().await;
        config.save(self.settings.as_ref()).await?;
        self.orchestrator.reload_config().await?;

        let changed = self.orchestrator.current_config().await != previous;
        info!(changed, "Sync configuration saved");
        Ok(changed)
    }

    pub async fn test_connection(&self) -> TestResult {
        self.orchestrator.test_connection().await
    }

    pub async fn sync_history(&self, mode: ExecutionMode) -> SyncTicket {
        self.orchestrator.sync_history(mode).await
    }

    pub async fn sync_settings(&self, mode: ExecutionMode) -> SyncTicket {
        self.orchestrator.sync_settings(mode).await
    }

    pub async fn sync_all(&self, mode: ExecutionMode) -> SyncTicket {
        self.orchestrator.sync_all(mode).await
    }

    pub async fn upload_backup(&self, mode: ExecutionMode) -> SyncTicket {
        self.orchestrator.upload_backup(mode).await
    }

    pub async fn download_backup(&self, mode: ExecutionMode) -> SyncTicket {
        self.orchestrator.download_backup(mode).await
    }

    // ------------------------------------------------------------------------
    // Auto-sync
    // ------------------------------------------------------------------------

    /// Schedule a recurring history sync at the stored interval.
    ///
    /// Replaces any schedule already running.
    #[instrument(skip(self))]
    pub async fn start_auto_sync(&self) -> Result<TaskId> {
        let interval = SyncInterval::load(self.settings.as_ref()).await?;

        let orchestrator = self.orchestrator.clone();
        let factory: TaskFactory = Arc::new(move || {
            let orchestrator = orchestrator.clone();
            async move {
                let report = orchestrator
                    .sync_history(ExecutionMode::Blocking)
                    .await
                    .wait()
                    .await;
                if report.success() {
                    info!(outcome = report.outcome.as_str(), "Auto-sync finished");
                } else {
                    warn!(
                        outcome = report.outcome.as_str(),
                        message = %report.message,
                        "Auto-sync did not complete"
                    );
                }
            }
            .boxed()
        });

        let id = self
            .dispatcher
            .schedule_recurring(AUTO_SYNC_TASK_ID, interval.as_duration(), factory)?;
        *self.auto_sync_slot() = Some(id.clone());

        info!(interval_minutes = interval.minutes(), "Auto-sync scheduled");
        Ok(id)
    }

    /// Cancel the recurring sync. Does nothing when none is scheduled.
    pub fn stop_auto_sync(&self) -> Result<()> {
        let Some(id) = self.auto_sync_slot().take() else {
            return Ok(());
        };
        self.dispatcher.cancel(&id)?;
        info!("Auto-sync stopped");
        Ok(())
    }

    pub fn auto_sync_status(&self) -> Option<TaskStatus> {
        let id = self.auto_sync_slot().clone()?;
        self.dispatcher.status(&id)
    }

    /// Store a new interval, rescheduling if auto-sync is running
    pub async fn set_sync_interval(&self, interval: SyncInterval) -> Result<()> {
        interval.save(self.settings.as_ref()).await?;
        if self.auto_sync_slot().is_some() {
            self.start_auto_sync().await?;
        }
        Ok(())
    }

    /// Start auto-sync if the user enabled it. Returns whether it is running.
    pub async fn resume_auto_sync(&self) -> Result<bool> {
        if !auto_sync_enabled(self.settings.as_ref()).await? {
            return Ok(false);
        }
        self.start_auto_sync().await?;
        Ok(true)
    }

    fn auto_sync_slot(&self) -> MutexGuard<'_, Option<TaskId>> {
        self.auto_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Err(e) = self.stop_auto_sync() {
            warn!(error = %e, "Failed to cancel auto-sync on shutdown");
        }
    }
}
