//! # Sync Orchestrator
//!
//! Sequences one sync cycle against the configured remote backend.
//!
//! ## Overview
//!
//! A cycle always runs in the same order:
//!
//! 1. Reload the sync configuration from the settings store and (re)build the
//!    backend if it changed
//! 2. Upload the full local snapshot, then confirm the file exists remotely
//! 3. Download the remote snapshot, if there is one
//! 4. Merge and apply the result to local storage
//!
//! Upload strictly precedes download so a device always offers its own state
//! before accepting merge candidates. An upload failure does not abort the
//! download.
//!
//! ## Single flight
//!
//! At most one cycle runs per orchestrator. A request made while a cycle is
//! running resolves immediately to [`SyncOutcome::AlreadyInProgress`]; it is
//! not queued. The in-flight flag is released by a drop guard, so it clears
//! however the cycle ends.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ExecutionMode, SyncOrchestrator};
//!
//! let ticket = orchestrator.sync_history(ExecutionMode::Background).await;
//! // ... later, on whichever context owns the UI:
//! let report = ticket.wait().await;
//! if report.success() {
//!     println!("merged {} new records", report.stats.inserted);
//! }
//! ```

use async_trait::async_trait;
use bridge_traits::{
    background::TaskDispatcher,
    storage::{RemoteBackend, SettingsStore},
};
use bytes::Bytes;
use core_runtime::config::SyncConfig;
use futures::FutureExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::connection::{classify_failure, TestResult};
use crate::error::{Result, SyncError};
use crate::merge::merge;
use crate::model::RecordSet;
use crate::report::{CycleId, SyncOperation, SyncOutcome, SyncReport, SyncStats, SyncTicket};
use crate::repository::HistoryRepository;
use crate::settings_sync::{export_settings, parse_remote_settings, plan_settings_merge};

/// Remote history file name
pub const HISTORY_FILE: &str = "xmbox_history.json";
/// Remote settings file name
pub const SETTINGS_FILE: &str = "xmbox_settings.json";
/// Remote backup file name
pub const BACKUP_FILE: &str = "xmbox_backup.json";

/// Builds the backend for a complete configuration.
///
/// Called once per configuration change, not once per call.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &SyncConfig) -> Result<Arc<dyn RemoteBackend>>;
}

/// Produces and restores the opaque full-backup blob
#[async_trait]
pub trait BackupProvider: Send + Sync {
    async fn create(&self) -> Result<Bytes>;
    async fn restore(&self, data: Bytes) -> Result<()>;
}

/// Where a sync operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On the caller's task; the ticket is already finished
    #[default]
    Blocking,
    /// On the task dispatcher; the ticket resolves later
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

/// Collaborators the orchestrator needs
pub struct OrchestratorDeps {
    pub settings: Arc<dyn SettingsStore>,
    pub history: Arc<dyn HistoryRepository>,
    pub backend_factory: Arc<dyn BackendFactory>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub backup: Option<Arc<dyn BackupProvider>>,
}

struct ActiveBackend {
    config: SyncConfig,
    backend: Arc<dyn RemoteBackend>,
}

enum ConfigState {
    Ready(Arc<dyn RemoteBackend>),
    Incomplete(String),
}

/// Result of the download half of a cycle
enum Download {
    /// No remote file, or it could not be read
    Absent,
    /// Remote file exists but could not be decoded
    Malformed(String),
    Applied(SyncStats),
}

/// Clears the in-flight flag when dropped
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Inner {
    settings: Arc<dyn SettingsStore>,
    history: Arc<dyn HistoryRepository>,
    backend_factory: Arc<dyn BackendFactory>,
    dispatcher: Arc<dyn TaskDispatcher>,
    backup: Option<Arc<dyn BackupProvider>>,
    active: RwLock<Option<ActiveBackend>>,
    in_flight: Arc<AtomicBool>,
}

/// Sync orchestrator. Cheap to clone; clones share state and the in-flight flag.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: deps.settings,
                history: deps.history,
                backend_factory: deps.backend_factory,
                dispatcher: deps.dispatcher,
                backup: deps.backup,
                active: RwLock::new(None),
                in_flight: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.inner.in_flight.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Whether the stored configuration is complete.
    ///
    /// Reads settings, so a configuration saved by an earlier process counts
    /// before the first sync runs.
    pub async fn is_configured(&self) -> bool {
        match self.refresh().await {
            Ok(state) => matches!(state, ConfigState::Ready(_)),
            Err(e) => {
                warn!(error = %e, "Could not load sync configuration");
                false
            }
        }
    }

    /// The configuration the current backend was built from
    pub async fn current_config(&self) -> Option<SyncConfig> {
        self.inner
            .active
            .read()
            .await
            .as_ref()
            .map(|active| active.config.clone())
    }

    /// Re-read the configuration from settings.
    ///
    /// Returns whether the result is usable. The backend is rebuilt only when
    /// the configuration changed.
    pub async fn reload_config(&self) -> Result<bool> {
        Ok(matches!(self.refresh().await?, ConfigState::Ready(_)))
    }

    async fn refresh(&self) -> Result<ConfigState> {
        let config = SyncConfig::load(self.inner.settings.as_ref()).await?;
        let mut active = self.inner.active.write().await;

        if let Err(e) = config.validate() {
            if active.take().is_some() {
                info!(mode = %config.mode(), "Sync configuration no longer complete");
            }
            return Ok(ConfigState::Incomplete(e.to_string()));
        }

        if let Some(current) = active.as_ref() {
            if current.config == config {
                return Ok(ConfigState::Ready(Arc::clone(&current.backend)));
            }
        }

        let backend = self.inner.backend_factory.build(&config)?;
        info!(mode = %config.mode(), backend = backend.name(), "Sync backend configured");
        *active = Some(ActiveBackend {
            config,
            backend: Arc::clone(&backend),
        });

        Ok(ConfigState::Ready(backend))
    }

    /// Probe the remote container and describe any failure in user terms
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> TestResult {
        let backend = match self.refresh().await {
            Ok(ConfigState::Ready(backend)) => backend,
            Ok(ConfigState::Incomplete(reason)) => return TestResult::failed(reason),
            Err(e) => {
                return TestResult::failed(format!("Could not load sync configuration: {}", e))
            }
        };

        let container = backend.container_path();
        match backend.list(&container).await {
            Ok(entries) => {
                debug!(entries = entries.len(), backend = backend.name(), "Connection test passed");
                TestResult::ok(format!("Connected ({} entries)", entries.len()))
            }
            Err(e) => {
                warn!(error = %e, backend = backend.name(), "Connection test failed");
                classify_failure(&e.to_string())
            }
        }
    }

    pub async fn sync_history(&self, mode: ExecutionMode) -> SyncTicket {
        self.launch(SyncOperation::History, mode).await
    }

    pub async fn sync_settings(&self, mode: ExecutionMode) -> SyncTicket {
        self.launch(SyncOperation::Settings, mode).await
    }

    /// History then settings under one guard acquisition
    pub async fn sync_all(&self, mode: ExecutionMode) -> SyncTicket {
        self.launch(SyncOperation::All, mode).await
    }

    pub async fn upload_backup(&self, mode: ExecutionMode) -> SyncTicket {
        self.launch(SyncOperation::BackupUpload, mode).await
    }

    pub async fn download_backup(&self, mode: ExecutionMode) -> SyncTicket {
        self.launch(SyncOperation::BackupDownload, mode).await
    }

    async fn launch(&self, operation: SyncOperation, mode: ExecutionMode) -> SyncTicket {
        let Some(guard) = InFlightGuard::try_acquire(&self.inner.in_flight) else {
            info!(operation = %operation, "Sync already in progress; request rejected");
            return SyncTicket::Finished(SyncReport::already_in_progress(operation));
        };

        match mode {
            ExecutionMode::Blocking => SyncTicket::Finished(self.run_cycle(operation, guard).await),
            ExecutionMode::Background => {
                let (tx, rx) = oneshot::channel();
                let this = self.clone();
                let task = async move {
                    let report = this.run_cycle(operation, guard).await;
                    if tx.send(report).is_err() {
                        debug!(operation = %operation, "Sync result dropped; caller went away");
                    }
                }
                .boxed();

                // On failure the task, and with it the guard, is dropped here
                match self.inner.dispatcher.dispatch(task) {
                    Ok(()) => SyncTicket::Pending {
                        operation,
                        receiver: rx,
                    },
                    Err(e) => SyncTicket::Finished(SyncReport::failed(
                        operation,
                        format!("Could not start background sync: {}", e),
                    )),
                }
            }
        }
    }

    async fn run_cycle(&self, operation: SyncOperation, guard: InFlightGuard) -> SyncReport {
        let cycle_id = CycleId::new();
        let span = info_span!("sync_cycle", cycle_id = %cycle_id, operation = %operation);

        async move {
            let _guard = guard;

            let report = match self.refresh().await {
                Ok(ConfigState::Ready(backend)) => self.run_operation(operation, backend).await,
                Ok(ConfigState::Incomplete(reason)) => {
                    SyncReport::new(operation, SyncOutcome::NotConfigured, reason)
                }
                Err(e) => SyncReport::failed(operation, format!("Could not load sync configuration: {}", e)),
            };

            if report.success() {
                info!(outcome = %report.outcome, message = %report.message, "Sync finished");
            } else {
                warn!(outcome = %report.outcome, message = %report.message, "Sync finished");
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn run_operation(
        &self,
        operation: SyncOperation,
        backend: Arc<dyn RemoteBackend>,
    ) -> SyncReport {
        let backend = backend.as_ref();
        match operation {
            SyncOperation::History => self.run_history(backend).await,
            SyncOperation::Settings => self.run_settings(backend).await,
            SyncOperation::All => {
                let history = self.run_history(backend).await;
                let settings = self.run_settings(backend).await;
                SyncReport::combine(history, settings)
            }
            SyncOperation::BackupUpload => self.run_backup_upload(backend).await,
            SyncOperation::BackupDownload => self.run_backup_download(backend).await,
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    async fn run_history(&self, backend: &dyn RemoteBackend) -> SyncReport {
        let path = backend.file_path(HISTORY_FILE);
        let upload = self.upload_history(backend, &path).await;
        let download = self.download_history(backend, &path).await;
        resolve(SyncOperation::History, upload, download)
    }

    async fn upload_history(&self, backend: &dyn RemoteBackend, path: &str) -> Result<usize> {
        let local = RecordSet::from_records(self.inner.history.find_all().await?);
        let body = local.to_json()?;

        self.ensure_container(backend).await;
        backend.put(path, Bytes::from(body)).await?;
        verify_uploaded(backend, path).await?;

        info!(records = local.len(), "Uploaded history");
        Ok(local.len())
    }

    async fn download_history(&self, backend: &dyn RemoteBackend, path: &str) -> Result<Download> {
        let Some(bytes) = fetch_remote(backend, path).await? else {
            return Ok(Download::Absent);
        };

        let remote = match RecordSet::from_json(&bytes) {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Remote history is malformed; ignoring it");
                return Ok(Download::Malformed(e.to_string()));
            }
        };

        let local = RecordSet::from_records(self.inner.history.find_all().await?);
        let decision = merge(&local, &remote);

        self.inner.history.insert(&decision.to_insert).await?;
        self.inner.history.update(&decision.to_update).await?;

        info!(
            remote = remote.len(),
            inserted = decision.to_insert.len(),
            updated = decision.to_update.len(),
            "Merged remote history"
        );

        Ok(Download::Applied(SyncStats {
            inserted: decision.to_insert.len(),
            updated: decision.to_update.len(),
            ..SyncStats::default()
        }))
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    async fn run_settings(&self, backend: &dyn RemoteBackend) -> SyncReport {
        let path = backend.file_path(SETTINGS_FILE);
        let upload = self.upload_settings(backend, &path).await;
        let download = self.download_settings(backend, &path).await;
        resolve(SyncOperation::Settings, upload, download)
    }

    async fn upload_settings(&self, backend: &dyn RemoteBackend, path: &str) -> Result<usize> {
        let local = self
            .inner
            .settings
            .get_all()
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;
        let exported = export_settings(&local);
        let count = exported.len();
        let body = serde_json::to_vec(&Value::Object(exported))
            .map_err(|e| SyncError::Settings(e.to_string()))?;

        self.ensure_container(backend).await;
        backend.put(path, Bytes::from(body)).await?;

        info!(keys = count, "Uploaded settings");
        Ok(count)
    }

    async fn download_settings(&self, backend: &dyn RemoteBackend, path: &str) -> Result<Download> {
        let Some(bytes) = fetch_remote(backend, path).await? else {
            return Ok(Download::Absent);
        };

        let remote = match parse_remote_settings(&bytes) {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Remote settings are malformed; ignoring them");
                return Ok(Download::Malformed(e.to_string()));
            }
        };

        let plan = plan_settings_merge(remote);
        for (key, value) in &plan.to_apply {
            self.inner
                .settings
                .put(key, value.clone())
                .await
                .map_err(|e| SyncError::Settings(format!("{}: {}", key, e)))?;
        }

        info!(applied = plan.to_apply.len(), skipped = plan.skipped, "Applied remote settings");

        Ok(Download::Applied(SyncStats {
            settings_applied: plan.to_apply.len(),
            settings_skipped: plan.skipped,
            ..SyncStats::default()
        }))
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    fn backup_provider(&self, operation: SyncOperation) -> std::result::Result<Arc<dyn BackupProvider>, SyncReport> {
        self.inner.backup.clone().ok_or_else(|| {
            SyncReport::new(
                operation,
                SyncOutcome::NotConfigured,
                "No backup provider registered",
            )
        })
    }

    async fn run_backup_upload(&self, backend: &dyn RemoteBackend) -> SyncReport {
        let operation = SyncOperation::BackupUpload;
        let provider = match self.backup_provider(operation) {
            Ok(provider) => provider,
            Err(report) => return report,
        };

        let result: Result<usize> = async {
            let data = provider.create().await?;
            let size = data.len();
            self.ensure_container(backend).await;
            backend.put(&backend.file_path(BACKUP_FILE), data).await?;
            Ok(size)
        }
        .await;

        match result {
            Ok(size) => {
                info!(bytes = size, "Uploaded backup");
                SyncReport::new(operation, SyncOutcome::Completed, "Backup uploaded").with_stats(
                    SyncStats {
                        uploaded: Some(size),
                        ..SyncStats::default()
                    },
                )
            }
            Err(e) => SyncReport::failed(operation, format!("Backup upload failed: {}", e)),
        }
    }

    async fn run_backup_download(&self, backend: &dyn RemoteBackend) -> SyncReport {
        let operation = SyncOperation::BackupDownload;
        let provider = match self.backup_provider(operation) {
            Ok(provider) => provider,
            Err(report) => return report,
        };

        let result: Result<bool> = async {
            match fetch_remote(backend, &backend.file_path(BACKUP_FILE)).await? {
                Some(data) => {
                    provider.restore(data).await?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        .await;

        match result {
            Ok(true) => SyncReport::new(operation, SyncOutcome::Completed, "Backup restored"),
            Ok(false) => SyncReport::new(operation, SyncOutcome::NothingToMerge, "No remote backup found"),
            Err(e) => SyncReport::failed(operation, format!("Backup download failed: {}", e)),
        }
    }

    /// Container creation is best-effort: some servers create it on `put`.
    async fn ensure_container(&self, backend: &dyn RemoteBackend) {
        let container = backend.container_path();
        if let Err(e) = backend.ensure_container(&container).await {
            warn!(error = %e, backend = backend.name(), "Could not create remote container; continuing");
        }
    }
}

/// Confirm an upload actually landed
async fn verify_uploaded(backend: &dyn RemoteBackend, path: &str) -> Result<()> {
    if backend.exists(path).await? {
        Ok(())
    } else {
        Err(SyncError::Transport(
            "Uploaded file is missing on the remote".to_string(),
        ))
    }
}

/// Read a remote file.
///
/// `Ok(None)` covers both "does not exist" and "exists but could not be read";
/// only a failed existence check is an error.
async fn fetch_remote(backend: &dyn RemoteBackend, path: &str) -> Result<Option<Bytes>> {
    if !backend.exists(path).await? {
        debug!(backend = backend.name(), "Remote file absent");
        return Ok(None);
    }

    match backend.get(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) => {
            warn!(error = %e, "Remote file could not be read; treating it as absent");
            Ok(None)
        }
    }
}

/// Fold the two halves of a cycle into one report
fn resolve(operation: SyncOperation, upload: Result<usize>, download: Result<Download>) -> SyncReport {
    let mut stats = SyncStats::default();
    let upload_error = match upload {
        Ok(count) => {
            stats.uploaded = Some(count);
            None
        }
        Err(e) => {
            warn!(error = %e, "Upload failed");
            Some(e.to_string())
        }
    };

    let (outcome, message) = match (download, upload_error) {
        (Ok(Download::Applied(applied)), None) => {
            stats.inserted = applied.inserted;
            stats.updated = applied.updated;
            stats.settings_applied = applied.settings_applied;
            stats.settings_skipped = applied.settings_skipped;
            (SyncOutcome::Completed, "Sync completed".to_string())
        }
        (Ok(Download::Applied(applied)), Some(upload_error)) => {
            stats.inserted = applied.inserted;
            stats.updated = applied.updated;
            stats.settings_applied = applied.settings_applied;
            stats.settings_skipped = applied.settings_skipped;
            (
                SyncOutcome::PartialSuccess,
                format!("Downloaded and merged, but upload failed: {}", upload_error),
            )
        }
        (Ok(Download::Absent), None) => (
            SyncOutcome::NothingToMerge,
            "Uploaded; no remote data to merge".to_string(),
        ),
        (Ok(Download::Malformed(reason)), None) => (
            SyncOutcome::NothingToMerge,
            format!("Uploaded; remote data unusable ({})", reason),
        ),
        (Ok(Download::Absent), Some(upload_error)) => (
            SyncOutcome::Failed,
            format!("Upload failed and no remote data found: {}", upload_error),
        ),
        (Ok(Download::Malformed(reason)), Some(upload_error)) => (
            SyncOutcome::Failed,
            format!(
                "Upload failed ({}) and remote data unusable ({})",
                upload_error, reason
            ),
        ),
        (Err(download_error), None) => (
            SyncOutcome::DownloadFailed,
            format!("Uploaded but download failed: {}", download_error),
        ),
        (Err(download_error), Some(upload_error)) => (
            SyncOutcome::Failed,
            format!(
                "Upload failed ({}) and download failed ({})",
                upload_error, download_error
            ),
        ),
    };

    SyncReport::new(operation, outcome, message).with_stats(stats)
}
