//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, settings,
//! task dispatch) and the local history repository into a [`SyncService`].
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`bootstrap_desktop`]; other hosts build a
//! [`CoreDependencies`] from their own adapters.

pub mod error;
pub mod factory;
pub mod service;

pub use error::{CoreError, Result};
pub use factory::DefaultBackendFactory;
pub use service::{SyncService, AUTO_SYNC_TASK_ID};

use std::sync::Arc;

use bridge_traits::{background::TaskDispatcher, http::HttpClient, storage::SettingsStore};
use core_sync::{BackendFactory, BackupProvider, HistoryRepository, OrchestratorDeps};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub history: Arc<dyn HistoryRepository>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub backup: Option<Arc<dyn BackupProvider>>,
    /// Overrides the default WebDAV / sync-code backend selection
    pub backend_factory: Option<Arc<dyn BackendFactory>>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        settings_store: Arc<dyn SettingsStore>,
        history: Arc<dyn HistoryRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            http_client,
            settings_store,
            history,
            dispatcher,
            backup: None,
            backend_factory: None,
        }
    }

    pub fn with_backup(mut self, backup: Arc<dyn BackupProvider>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_backend_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.backend_factory = Some(factory);
        self
    }

    fn into_orchestrator_deps(self) -> OrchestratorDeps {
        let backend_factory = self.backend_factory.unwrap_or_else(|| {
            Arc::new(DefaultBackendFactory::new(Arc::clone(&self.http_client)))
        });
        OrchestratorDeps {
            settings: self.settings_store,
            history: self.history,
            backend_factory,
            dispatcher: self.dispatcher,
            backup: self.backup,
        }
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Settings and history live in two SQLite files under `data_dir`, which is
/// created if missing. Must be called from within a Tokio runtime.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let data_dir = bridge_desktop::default_data_dir();
/// let service = core_service::bootstrap_desktop(&data_dir).await?;
/// service.resume_auto_sync().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(data_dir: impl AsRef<std::path::Path>) -> Result<SyncService> {
    use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioTaskDispatcher};
    use core_sync::SqliteHistoryRepository;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

    let data_dir = data_dir.as_ref();
    tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
        CoreError::InitializationFailed(format!(
            "cannot create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let http_client = ReqwestHttpClient::new()?;
    let settings = SqliteSettingsStore::new(data_dir.join("settings.db")).await?;

    let options = SqliteConnectOptions::new()
        .filename(data_dir.join("history.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| CoreError::InitializationFailed(format!("history database: {}", e)))?;
    let history = SqliteHistoryRepository::new(pool);
    history.initialize().await?;

    let dispatcher = TokioTaskDispatcher::new();

    tracing::info!(data_dir = %data_dir.display(), "Desktop core bootstrapped");

    Ok(SyncService::new(CoreDependencies::new(
        Arc::new(http_client),
        Arc::new(settings),
        Arc::new(history),
        Arc::new(dispatcher),
    )))
}
