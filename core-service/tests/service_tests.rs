//! Composition-root tests: backend selection, configuration edits, the
//! auto-sync schedule and the desktop bootstrap.

use async_trait::async_trait;
use bridge_desktop::{ReqwestHttpClient, TokioTaskDispatcher};
use bridge_traits::background::TaskStatus;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::HttpClient;
use bridge_traits::storage::{join_path, RemoteBackend, RemoteEntry, SettingsStore};
use bytes::Bytes;
use core_runtime::config::{keys, AccountConfig, CodeConfig, SyncConfig, SyncInterval};
use core_service::{
    bootstrap_desktop, CoreDependencies, DefaultBackendFactory, SyncService, AUTO_SYNC_TASK_ID,
};
use core_sync::{
    BackendFactory, ExecutionMode, HistoryRecord, HistoryRepository, SyncOutcome, HISTORY_FILE,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct MemorySettings {
    values: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get_all(&self) -> BridgeResult<HashMap<String, Value>> {
        Ok(self.values.lock().unwrap().clone())
    }

    async fn get(&self, key: &str) -> BridgeResult<Option<Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> BridgeResult<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

#[async_trait]
impl HistoryRepository for MemoryHistory {
    async fn find_all(&self) -> core_sync::Result<Vec<HistoryRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn insert(&self, records: &[HistoryRecord]) -> core_sync::Result<()> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn update(&self, records: &[HistoryRecord]) -> core_sync::Result<()> {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            if let Some(existing) = stored.iter_mut().find(|r| r.key == record.key) {
                *existing = record.clone();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBackend {
    files: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn container_path(&self) -> String {
        "mem://sync/".to_string()
    }

    async fn exists(&self, path: &str) -> BridgeResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn get(&self, path: &str) -> BridgeResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))
    }

    async fn put(&self, path: &str, data: Bytes) -> BridgeResult<()> {
        self.files.lock().unwrap().insert(path.to_string(), data);
        Ok(())
    }

    async fn list(&self, _path: &str) -> BridgeResult<Vec<RemoteEntry>> {
        Ok(Vec::new())
    }

    async fn ensure_container(&self, _path: &str) -> BridgeResult<()> {
        Ok(())
    }
}

struct SharedBackendFactory {
    backend: Arc<MemoryBackend>,
}

impl BackendFactory for SharedBackendFactory {
    fn build(&self, _config: &SyncConfig) -> core_sync::Result<Arc<dyn RemoteBackend>> {
        Ok(self.backend.clone())
    }
}

fn http() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new().unwrap())
}

fn code_config() -> SyncConfig {
    SyncConfig::Code(CodeConfig {
        sync_code: "AB12CD34".to_string(),
        public_base_url: "https://sync.example.com/codes".to_string(),
        write_token: None,
        write_endpoint: None,
    })
}

struct Harness {
    service: SyncService,
    settings: Arc<MemorySettings>,
    backend: Arc<MemoryBackend>,
}

fn harness() -> Harness {
    let settings = Arc::new(MemorySettings::default());
    let backend = Arc::new(MemoryBackend::default());
    let history = Arc::new(MemoryHistory::default());
    history
        .records
        .lock()
        .unwrap()
        .push(HistoryRecord::new("movie-1", 100, 5));

    let deps = CoreDependencies::new(
        http(),
        settings.clone(),
        history,
        Arc::new(TokioTaskDispatcher::new()),
    )
    .with_backend_factory(Arc::new(SharedBackendFactory {
        backend: backend.clone(),
    }));

    Harness {
        service: SyncService::new(deps),
        settings,
        backend,
    }
}

// ============================================================================
// Backend selection
// ============================================================================

#[tokio::test]
async fn test_default_factory_selects_variant_by_mode() {
    let factory = DefaultBackendFactory::new(http());

    let account = SyncConfig::Account(AccountConfig {
        url: "https://dav.example.com/dav".to_string(),
        username: "alice".to_string(),
        password: "secret".to_string(),
    });
    let backend = factory.build(&account).unwrap();
    assert_eq!(backend.name(), "webdav");
    assert_eq!(backend.container_path(), "https://dav.example.com/dav/");

    let backend = factory.build(&code_config()).unwrap();
    assert_eq!(backend.name(), "sync_code");
    assert_eq!(
        backend.container_path(),
        "https://sync.example.com/codes/AB12CD34/"
    );
}

#[tokio::test]
async fn test_default_factory_rejects_incomplete_config() {
    let factory = DefaultBackendFactory::new(http());
    let incomplete = SyncConfig::Account(AccountConfig::default());
    assert!(factory.build(&incomplete).is_err());
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_configure_persists_and_activates() {
    let h = harness();
    assert!(!h.service.is_configured().await);

    assert!(h.service.configure(&code_config()).await.unwrap());
    assert!(h.service.is_configured().await);
    assert_eq!(
        h.settings.get_string(keys::SYNC_CODE).await.unwrap().as_deref(),
        Some("AB12CD34")
    );

    // Same config again: nothing to rebuild
    assert!(!h.service.configure(&code_config()).await.unwrap());

    let SyncConfig::Code(mut edited) = code_config() else {
        unreachable!()
    };
    edited.sync_code = "ZZ99YY88".to_string();
    assert!(h.service.configure(&SyncConfig::Code(edited)).await.unwrap());
}

#[tokio::test]
async fn test_restarted_service_sees_saved_config() {
    let h = harness();
    h.service.configure(&code_config()).await.unwrap();

    let restarted = SyncService::new(
        CoreDependencies::new(
            http(),
            h.settings.clone(),
            Arc::new(MemoryHistory::default()),
            Arc::new(TokioTaskDispatcher::new()),
        )
        .with_backend_factory(Arc::new(SharedBackendFactory {
            backend: h.backend.clone(),
        })),
    );

    assert!(restarted.is_configured().await);
    // Loaded from settings, so saving it again changes nothing
    assert!(!restarted.configure(&code_config()).await.unwrap());
}

#[tokio::test]
async fn test_configure_rejects_incomplete_without_saving() {
    let h = harness();
    let incomplete = SyncConfig::Code(CodeConfig::default());

    assert!(h.service.configure(&incomplete).await.is_err());
    assert!(h.settings.get(keys::SYNC_MODE).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_before_configuration_reports_not_configured() {
    let h = harness();
    let report = h.service.sync_history(ExecutionMode::Blocking).await.wait().await;
    assert_eq!(report.outcome, SyncOutcome::NotConfigured);
    assert!(h.backend.files.lock().unwrap().is_empty());
}

// ============================================================================
// Auto-sync
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_auto_sync_uploads_each_interval_until_stopped() {
    let h = harness();
    h.service.configure(&code_config()).await.unwrap();
    h.service
        .set_sync_interval(SyncInterval::FifteenMinutes)
        .await
        .unwrap();

    let id = h.service.start_auto_sync().await.unwrap();
    assert_eq!(id.0, AUTO_SYNC_TASK_ID);
    assert_eq!(h.service.auto_sync_status(), Some(TaskStatus::Scheduled));

    tokio::time::sleep(Duration::from_secs(16 * 60)).await;
    let path = join_path("mem://sync/", HISTORY_FILE);
    assert!(h.backend.files.lock().unwrap().contains_key(&path));

    h.service.stop_auto_sync().unwrap();
    assert_eq!(h.service.auto_sync_status(), None);
    h.backend.files.lock().unwrap().clear();

    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert!(h.backend.files.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_auto_sync_follows_stored_preference() {
    let h = harness();
    assert!(!h.service.resume_auto_sync().await.unwrap());
    assert_eq!(h.service.auto_sync_status(), None);

    h.settings
        .set_string(keys::AUTO_SYNC, "true")
        .await
        .unwrap();
    assert!(h.service.resume_auto_sync().await.unwrap());
    assert_eq!(h.service.auto_sync_status(), Some(TaskStatus::Scheduled));

    h.service.stop_auto_sync().unwrap();
}

#[tokio::test]
async fn test_stop_without_schedule_is_noop() {
    let h = harness();
    assert!(h.service.stop_auto_sync().is_ok());
}

// ============================================================================
// Desktop bootstrap
// ============================================================================

#[tokio::test]
async fn test_desktop_bootstrap_creates_stores() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("watchsync");

    let service = bootstrap_desktop(&data_dir).await.unwrap();

    assert!(data_dir.join("settings.db").exists());
    assert!(data_dir.join("history.db").exists());
    assert!(!service.is_configured().await);

    let report = service.sync_all(ExecutionMode::Blocking).await.wait().await;
    assert_eq!(report.outcome, SyncOutcome::NotConfigured);
}

#[tokio::test]
async fn test_desktop_bootstrap_loads_saved_config() {
    let dir = tempfile::tempdir().unwrap();

    let service = bootstrap_desktop(dir.path()).await.unwrap();
    service.configure(&code_config()).await.unwrap();
    drop(service);

    let service = bootstrap_desktop(dir.path()).await.unwrap();
    assert!(service.is_configured().await);
}
