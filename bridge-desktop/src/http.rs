//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Reqwest-based HTTP client.
///
/// One pooled client per instance. WebDAV verbs go out as extension
/// methods; streamed downloads wrap the body stream in a `StreamReader`.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("watchsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> Result<reqwest::Method> {
        match method {
            HttpMethod::Get => Ok(reqwest::Method::GET),
            HttpMethod::Head => Ok(reqwest::Method::HEAD),
            HttpMethod::Put => Ok(reqwest::Method::PUT),
            HttpMethod::Patch => Ok(reqwest::Method::PATCH),
            HttpMethod::Propfind | HttpMethod::Mkcol => {
                reqwest::Method::from_bytes(method.as_str().as_bytes())
                    .map_err(|e| BridgeError::OperationFailed(format!("Unsupported method: {}", e)))
            }
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder> {
        let method = Self::convert_method(request.method)?;
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        Ok(req)
    }

    fn map_send_error(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Transport(format!("Request timed out: {}", error))
        } else if error.is_connect() {
            BridgeError::Transport(format!("Connection failed: {}", error))
        } else {
            BridgeError::Transport(error.to_string())
        }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to read body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "HTTP request");

        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::into_response(response).await
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        // reqwest reports `None` for chunked bodies and `Some(0)` for HEAD-like answers
        let content_length = response.content_length().filter(|len| *len > 0);

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(HttpStream {
            status,
            content_length,
            body: Box::new(reader),
        })
    }
}
