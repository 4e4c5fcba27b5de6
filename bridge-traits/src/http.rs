//! HTTP transport contract.
//!
//! Covers plain file transfer (`GET`/`HEAD`/`PUT`), `PATCH` for JSON write
//! APIs, the two WebDAV verbs
//! account backends need, and streamed downloads for large payloads.
//!
//! Implementations make exactly one attempt per call. Retrying is the
//! caller's business: the update fetcher retries, the sync orchestrator
//! deliberately does not.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    /// Partial update, used by JSON write APIs
    Patch,
    /// WebDAV property lookup, used to list a collection
    Propfind,
    /// WebDAV collection creation
    Mkcol,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Propfind => "PROPFIND",
            HttpMethod::Mkcol => "MKCOL",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Overrides the client-wide timeout for this request
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Attach a pre-encoded `Basic` credential (base64 of `user:password`)
    pub fn basic_auth(self, encoded: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Basic {}", encoded.as_ref()))
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Fully buffered response. Non-2xx statuses arrive here, not as errors.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }

    pub fn text(&self) -> Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|e| BridgeError::OperationFailed(format!("Response is not UTF-8: {}", e)))
    }
}

/// Streamed response for large downloads
pub struct HttpStream {
    pub status: u16,
    /// Value of `Content-Length`, when the server sent a usable one
    pub content_length: Option<u64>,
    pub body: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

impl HttpStream {
    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }
}

impl fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Async HTTP client.
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn read_history(client: &dyn HttpClient, url: &str, auth: &str) -> Result<String> {
///     let response = client.execute(HttpRequest::get(url).basic_auth(auth)).await?;
///     response.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request and buffer the whole body.
    ///
    /// # Errors
    ///
    /// `BridgeError::Transport` when no response arrived: connection, TLS or
    /// timeout failures.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Send one request and hand back the body as a reader.
    ///
    /// The status is reported rather than checked so callers can build their
    /// own error messages.
    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream>;
}
