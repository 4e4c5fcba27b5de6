//! WebDAV account backend
//!
//! Implements `RemoteBackend` over plain WebDAV verbs with HTTP Basic
//! authentication. Every sync file lives directly in the configured base URL.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{normalize_base, RemoteBackend, RemoteEntry};
use bytes::Bytes;
use core_runtime::config::AccountConfig;
use core_runtime::logging::redact_url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::WebDavError;
use crate::propfind::parse_multistatus;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body sent with `PROPFIND`; asks only for what listing needs
const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
  </d:prop>
</d:propfind>"#;

/// WebDAV backend
///
/// # Example
///
/// ```ignore
/// use provider_webdav::WebDavBackend;
/// use bridge_traits::storage::RemoteBackend;
///
/// let backend = WebDavBackend::new(http_client, &account);
/// let history = backend.get(&backend.file_path("xmbox_history.json")).await?;
/// ```
pub struct WebDavBackend {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    /// base64 of `username:password`
    credentials: String,
}

impl WebDavBackend {
    pub fn new(http_client: Arc<dyn HttpClient>, account: &AccountConfig) -> Self {
        let credentials = STANDARD.encode(format!(
            "{}:{}",
            account.username.trim(),
            account.password
        ));

        Self {
            http_client,
            base_url: normalize_base(&account.url),
            credentials,
        }
    }

    fn request(&self, method: HttpMethod, url: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .basic_auth(self.credentials.clone())
            .timeout(REQUEST_TIMEOUT)
    }

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, WebDavError> {
        let method = request.method.as_str();
        let url = redact_url(&request.url);
        let response = self.http_client.execute(request).await?;
        debug!(method, url = %url, status = response.status, "WebDAV request");
        Ok(response)
    }

    fn check(
        response: HttpResponse,
        method: HttpMethod,
        url: &str,
    ) -> std::result::Result<HttpResponse, WebDavError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(WebDavError::from_status(
                response.status,
                method.as_str(),
                &redact_url(url),
            ))
        }
    }
}

#[async_trait]
impl RemoteBackend for WebDavBackend {
    fn name(&self) -> &'static str {
        "webdav"
    }

    fn container_path(&self) -> String {
        self.base_url.clone()
    }

    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.send(self.request(HttpMethod::Head, path)).await?;
        match response.status {
            404 => Ok(false),
            _ => Self::check(response, HttpMethod::Head, path)
                .map(|_| true)
                .map_err(Into::into),
        }
    }

    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn get(&self, path: &str) -> Result<Bytes> {
        let response = self.send(self.request(HttpMethod::Get, path)).await?;
        let response = Self::check(response, HttpMethod::Get, path)?;
        Ok(response.body)
    }

    #[instrument(skip_all, fields(path = %redact_url(path), bytes = data.len()))]
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let request = self
            .request(HttpMethod::Put, path)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(data);
        let response = self.send(request).await?;
        Self::check(response, HttpMethod::Put, path)?;
        Ok(())
    }

    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let request = self
            .request(HttpMethod::Propfind, path)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(Bytes::from_static(PROPFIND_BODY.as_bytes()));
        let response = self.send(request).await?;
        let response = Self::check(response, HttpMethod::Propfind, path)?;

        let text = response.text()?;
        let entries = parse_multistatus(&text)?;
        debug!(entries = entries.len(), "Listed WebDAV collection");
        Ok(entries)
    }

    /// Create the collection unless it already exists
    #[instrument(skip_all, fields(path = %redact_url(path)))]
    async fn ensure_container(&self, path: &str) -> Result<()> {
        if self.exists(path).await? {
            return Ok(());
        }

        let response = self.send(self.request(HttpMethod::Mkcol, path)).await?;
        // 405: collection appeared between the check and the create
        if response.status == 405 {
            return Ok(());
        }
        Self::check(response, HttpMethod::Mkcol, path)?;
        debug!("Created WebDAV collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::HttpStream;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream>;
        }
    }

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn account() -> AccountConfig {
        AccountConfig {
            url: "https://dav.example.com/dav".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
        }
    }

    fn webdav(mock: MockHttpClient) -> WebDavBackend {
        WebDavBackend::new(Arc::new(mock), &account())
    }

    #[test]
    fn test_paths_are_under_normalized_base() {
        let backend = webdav(MockHttpClient::new());
        assert_eq!(backend.container_path(), "https://dav.example.com/dav/");
        assert_eq!(
            backend.file_path("xmbox_history.json"),
            "https://dav.example.com/dav/xmbox_history.json"
        );
    }

    #[tokio::test]
    async fn test_exists_sends_basic_auth_head() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Head
                    && request.headers.get("Authorization").map(String::as_str)
                        == Some("Basic YWxpY2U6c2VjcmV0")
            })
            .times(1)
            .returning(|_| Ok(response(200, "")));

        let backend = webdav(mock);
        assert!(backend
            .exists("https://dav.example.com/dav/xmbox_history.json")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_exists_is_false_only_on_404() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "")));
        let backend = webdav(mock);
        assert!(!backend.exists("https://dav.example.com/dav/x").await.unwrap());

        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, "")));
        let backend = webdav(mock);
        let err = backend
            .exists("https://dav.example.com/dav/x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_put_failure_surfaces_status() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Put && request.body.is_some())
            .times(1)
            .returning(|_| Ok(response(507, "")));

        let backend = webdav(mock);
        let err = backend
            .put("https://dav.example.com/dav/x", Bytes::from_static(b"[]"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(ref msg) if msg.contains("507")));
    }

    #[tokio::test]
    async fn test_get_returns_body() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, "[]")));

        let backend = webdav(mock);
        let body = backend.get("https://dav.example.com/dav/x").await.unwrap();
        assert_eq!(body, Bytes::from_static(b"[]"));
    }

    #[tokio::test]
    async fn test_list_uses_depth_one_propfind() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Propfind
                    && request.headers.get("Depth").map(String::as_str) == Some("1")
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    207,
                    r#"<d:multistatus xmlns:d="DAV:">
                        <d:response><d:href>/dav/</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat></d:response>
                        <d:response><d:href>/dav/xmbox_history.json</d:href><d:propstat><d:prop><d:resourcetype/><d:getcontentlength>12</d:getcontentlength></d:prop></d:propstat></d:response>
                    </d:multistatus>"#,
                ))
            });

        let backend = webdav(mock);
        let entries = backend.list("https://dav.example.com/dav/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_container);
        assert_eq!(entries[1].size, Some(12));
    }

    #[tokio::test]
    async fn test_ensure_container_skips_existing() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Head)
            .times(1)
            .returning(|_| Ok(response(200, "")));

        let backend = webdav(mock);
        backend
            .ensure_container("https://dav.example.com/dav/")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_container_creates_missing() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Head)
            .times(1)
            .returning(|_| Ok(response(404, "")));
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Mkcol)
            .times(1)
            .returning(|_| Ok(response(201, "")));

        let backend = webdav(mock);
        backend
            .ensure_container("https://dav.example.com/dav/")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Transport("dns error: UnknownHost".to_string())));

        let backend = webdav(mock);
        let err = backend.get("https://dav.example.com/dav/x").await.unwrap_err();
        assert_eq!(err.to_string(), "Transport error: dns error: UnknownHost");
    }
}
