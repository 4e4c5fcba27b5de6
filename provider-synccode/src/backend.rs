//! Public-code backend
//!
//! A short shared code selects a folder under a public HTTP endpoint. Reads
//! are anonymous. Writes need a bearer write token and go either to the same
//! URL with `PUT`, or, when a write endpoint is configured, to that endpoint
//! as a gist-style `PATCH {"files": {"<code>/<file>": {"content": ..}}}`.
//! Devices that only know the code can pull but never push.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{normalize_base, RemoteBackend, RemoteEntry};
use bytes::Bytes;
use core_runtime::config::CodeConfig;
use core_runtime::logging::redact_url;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::SyncCodeError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SyncCodeBackend {
    http_client: Arc<dyn HttpClient>,
    public_base: String,
    /// `{public_base}/{code}/`
    container: String,
    write_token: Option<String>,
    write_endpoint: Option<String>,
}

impl SyncCodeBackend {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &CodeConfig) -> Self {
        let public_base = normalize_base(&config.public_base_url);
        let container = format!(
            "{}{}/",
            public_base,
            urlencoding::encode(config.sync_code.trim())
        );

        Self {
            http_client,
            public_base,
            container,
            write_token: config.write_token.clone().filter(|t| !t.is_empty()),
            write_endpoint: config
                .write_endpoint
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        }
    }

    /// `PUT` the bytes where readers will fetch them
    fn direct_upload(path: &str, token: &str, data: Bytes) -> HttpRequest {
        HttpRequest::new(HttpMethod::Put, path)
            .bearer_token(token)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(data)
    }

    /// Gist-style update naming the file by its path under the public base
    fn api_upload(
        &self,
        endpoint: &str,
        path: &str,
        token: &str,
        data: &[u8],
    ) -> std::result::Result<HttpRequest, SyncCodeError> {
        let relative = path.strip_prefix(&self.public_base).unwrap_or(path);
        let name = urlencoding::decode(relative)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| relative.to_string());
        let content = std::str::from_utf8(data)
            .map_err(|e| SyncCodeError::InvalidPayload(e.to_string()))?;

        let body = json!({ "files": { name: { "content": content } } });
        let body = serde_json::to_vec(&body)
            .map_err(|e| SyncCodeError::InvalidPayload(e.to_string()))?;

        Ok(HttpRequest::new(HttpMethod::Patch, endpoint)
            .bearer_token(token)
            .header("Accept", "application/vnd.github+json")
            .header("Content-Type", "application/json; charset=utf-8")
            .body(Bytes::from(body)))
    }

    /// Whether this device can upload
    pub fn can_write(&self) -> bool {
        self.write_token.is_some()
    }

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, SyncCodeError> {
        let method = request.method.as_str();
        let url = redact_url(&request.url);
        let response = self.http_client.execute(request).await?;
        debug!(method, url = %url, status = response.status, "Sync-code request");
        Ok(response)
    }

    fn unexpected(response: &HttpResponse, method: HttpMethod, url: &str) -> SyncCodeError {
        match response.status {
            404 => SyncCodeError::NotFound(redact_url(url)),
            status => SyncCodeError::UnexpectedStatus {
                status,
                method: method.as_str(),
                url: redact_url(url),
            },
        }
    }
}

#[async_trait]
impl RemoteBackend for SyncCodeBackend {
    fn name(&self) -> &'static str {
        "sync_code"
    }

    fn container_path(&self) -> String {
        self.container.clone()
    }

    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let request = HttpRequest::new(HttpMethod::Head, path).timeout(REQUEST_TIMEOUT);
        let response = self.send(request).await?;
        match response.status {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::unexpected(&response, HttpMethod::Head, path).into()),
        }
    }

    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn get(&self, path: &str) -> Result<Bytes> {
        let response = self.send(HttpRequest::get(path).timeout(REQUEST_TIMEOUT)).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(Self::unexpected(&response, HttpMethod::Get, path).into())
        }
    }

    #[instrument(skip_all, fields(path = %redact_url(path), bytes = data.len()))]
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let Some(token) = self.write_token.as_deref() else {
            warn!("No write token configured; upload refused");
            return Err(SyncCodeError::MissingWriteToken.into());
        };

        let request = match self.write_endpoint.as_deref() {
            Some(endpoint) => self.api_upload(endpoint, path, token, &data)?,
            None => Self::direct_upload(path, token, data),
        };
        let method = request.method;
        let target = request.url.clone();
        let response = self.send(request.timeout(REQUEST_TIMEOUT)).await?;

        match response.status {
            200..=299 => Ok(()),
            401 | 403 => Err(SyncCodeError::WriteRejected {
                status: response.status,
            }
            .into()),
            _ => Err(Self::unexpected(&response, method, &target).into()),
        }
    }

    /// Probe the code folder.
    ///
    /// Public endpoints rarely support directory listings, so this only checks
    /// that the folder answers. A 404 is an error like any other status: the
    /// code or base URL is wrong, or nothing was ever uploaded under it.
    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let response = self
            .send(HttpRequest::get(path).timeout(REQUEST_TIMEOUT))
            .await?;

        match response.status {
            200..=299 => Ok(vec![RemoteEntry {
                href: path.to_string(),
                is_container: true,
                size: None,
            }]),
            _ => Err(Self::unexpected(&response, HttpMethod::Get, path).into()),
        }
    }

    /// Folders appear implicitly on first write
    async fn ensure_container(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}
