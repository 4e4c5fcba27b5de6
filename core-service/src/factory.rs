//! Backend selection.
//!
//! The variant is chosen once per configuration change; calls on the
//! resulting backend never branch on the sync mode again.

use bridge_traits::{http::HttpClient, storage::RemoteBackend};
use core_runtime::config::SyncConfig;
use core_sync::{BackendFactory, Result};
use provider_synccode::SyncCodeBackend;
use provider_webdav::WebDavBackend;
use std::sync::Arc;
use tracing::debug;

/// Builds a WebDAV backend for account mode and a public-code backend for code mode
pub struct DefaultBackendFactory {
    http_client: Arc<dyn HttpClient>,
}

impl DefaultBackendFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn build(&self, config: &SyncConfig) -> Result<Arc<dyn RemoteBackend>> {
        config.validate()?;

        let backend: Arc<dyn RemoteBackend> = match config {
            SyncConfig::Account(account) => {
                Arc::new(WebDavBackend::new(Arc::clone(&self.http_client), account))
            }
            SyncConfig::Code(code) => {
                let backend = SyncCodeBackend::new(Arc::clone(&self.http_client), code);
                if !backend.can_write() {
                    debug!("Sync code backend has no write token; uploads will be refused");
                }
                Arc::new(backend)
            }
        };

        debug!(backend = backend.name(), "Built remote backend");
        Ok(backend)
    }
}
