//! # Resilient Fetch
//!
//! Downloads one file to disk with retries, an optional fallback URL and an
//! integrity gate.
//!
//! ## Algorithm
//!
//! ```text
//! for url in [primary, fallback (if present and different)]:
//!     for attempt in 1..=max_attempts:
//!         stream url → destination in fixed-size chunks, reporting progress
//!         verify size / header / digest
//!         ok → success
//!         err → delete destination, sleep attempt * base_delay
//! report the last error
//! ```
//!
//! Cancelling a running fetch aborts the in-flight request, deletes the
//! partial file and silences every later listener callback.

use bridge_traits::background::TaskDispatcher;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_runtime::config::FetchPolicy;
use core_runtime::logging::{redact_url, strip_path};
use futures::FutureExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{FetchError, Result};
use crate::verify::{verify_download, Expectations, PayloadKind};

// ============================================================================
// Job
// ============================================================================

/// One file to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub destination: PathBuf,
    /// Known size; when absent the response's `Content-Length` is used
    pub expected_length: Option<u64>,
    pub expected_sha256: Option<String>,
    pub kind: PayloadKind,
}

impl DownloadJob {
    pub fn new(primary_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            primary_url: primary_url.into(),
            fallback_url: None,
            destination: destination.into(),
            expected_length: None,
            expected_sha256: None,
            kind: PayloadKind::Data,
        }
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn with_expected_length(mut self, length: u64) -> Self {
        self.expected_length = Some(length);
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into());
        self
    }

    pub fn package(mut self) -> Self {
        self.kind = PayloadKind::Package;
        self
    }

    /// URLs in the order they are tried. A fallback equal to the primary is dropped.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls = vec![self.primary_url.as_str()];
        if let Some(fallback) = self
            .fallback_url
            .as_deref()
            .filter(|url| !url.is_empty() && *url != self.primary_url)
        {
            urls.push(fallback);
        }
        urls
    }

    fn validate(&self) -> Result<()> {
        if self.primary_url.trim().is_empty() {
            return Err(FetchError::InvalidJob("download URL is empty".to_string()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(FetchError::InvalidJob("destination path is empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Listener
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProgress {
    /// 0..=100
    Percent(u8),
    /// Total size unknown
    Indeterminate,
}

/// Receives fetch callbacks.
///
/// Callbacks run on the fetch task. Implementations that must run on a
/// particular context forward the call there; [`FetchEvent`] senders do this
/// through a channel.
pub trait FetchListener: Send + Sync {
    fn on_progress(&self, progress: FetchProgress);
    fn on_success(&self, path: &Path);
    fn on_error(&self, message: &str);
}

/// Listener callbacks as values, for hosts that drain a channel on their own context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Progress(FetchProgress),
    Success(PathBuf),
    Error(String),
}

impl FetchListener for mpsc::UnboundedSender<FetchEvent> {
    fn on_progress(&self, progress: FetchProgress) {
        let _ = self.send(FetchEvent::Progress(progress));
    }

    fn on_success(&self, path: &Path) {
        let _ = self.send(FetchEvent::Success(path.to_path_buf()));
    }

    fn on_error(&self, message: &str) {
        let _ = self.send(FetchEvent::Error(message.to_string()));
    }
}

/// Drops callbacks once the fetch is cancelled
struct GatedListener {
    inner: Arc<dyn FetchListener>,
    token: CancellationToken,
}

impl GatedListener {
    fn live(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn progress(&self, progress: FetchProgress) {
        if self.live() {
            self.inner.on_progress(progress);
        }
    }

    fn success(&self, path: &Path) {
        if self.live() {
            self.inner.on_success(path);
        }
    }

    fn error(&self, message: &str) {
        if self.live() {
            self.inner.on_error(message);
        }
    }
}

// ============================================================================
// Outcome and handle
// ============================================================================

/// Terminal state of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed(PathBuf),
    /// Every attempt on every URL failed; carries the last error message
    Failed(String),
    Cancelled,
}

impl FetchOutcome {
    pub fn success(&self) -> bool {
        matches!(self, FetchOutcome::Completed(_))
    }
}

/// Handle to a fetch running on the task dispatcher
#[derive(Debug)]
pub struct FetchHandle {
    token: CancellationToken,
    outcome: oneshot::Receiver<FetchOutcome>,
}

impl FetchHandle {
    /// Abort the fetch. The partial file is removed before [`wait`](Self::wait) resolves.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(self) -> FetchOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) if self.token.is_cancelled() => FetchOutcome::Cancelled,
            Err(_) => FetchOutcome::Failed("Fetch task ended without a result".to_string()),
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Downloads files with retry, fallback and verification.
///
/// # Example
///
/// ```ignore
/// let fetcher = ResilientFetcher::new(http_client, dispatcher, FetchPolicy::default())?;
/// let job = DownloadJob::new(primary, "/tmp/update.apk")
///     .with_fallback(mirror)
///     .package();
///
/// let handle = fetcher.start(job, listener)?;
/// // user pressed "cancel"
/// handle.cancel();
/// ```
pub struct ResilientFetcher {
    http_client: Arc<dyn HttpClient>,
    dispatcher: Arc<dyn TaskDispatcher>,
    policy: FetchPolicy,
}

impl ResilientFetcher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        dispatcher: Arc<dyn TaskDispatcher>,
        policy: FetchPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            http_client,
            dispatcher,
            policy,
        })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Run the fetch on the task dispatcher
    pub fn start(&self, job: DownloadJob, listener: Arc<dyn FetchListener>) -> Result<FetchHandle> {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let fetcher = ResilientFetcher {
            http_client: Arc::clone(&self.http_client),
            dispatcher: Arc::clone(&self.dispatcher),
            policy: self.policy.clone(),
        };
        let task_token = token.clone();
        let task = async move {
            let outcome = fetcher.fetch(&job, listener, task_token).await;
            let _ = tx.send(outcome);
        }
        .boxed();

        self.dispatcher
            .dispatch(task)
            .map_err(|e| FetchError::InvalidJob(format!("could not start download: {}", e)))?;

        Ok(FetchHandle { token, outcome: rx })
    }

    /// Run the fetch on the caller's task
    pub async fn fetch(
        &self,
        job: &DownloadJob,
        listener: Arc<dyn FetchListener>,
        token: CancellationToken,
    ) -> FetchOutcome {
        let listener = GatedListener {
            inner: listener,
            token: token.clone(),
        };

        if let Err(e) = job.validate() {
            listener.error(&e.to_string());
            return FetchOutcome::Failed(e.to_string());
        }

        let destination = job.destination.to_string_lossy();
        let span = info_span!("fetch", file = strip_path(&destination));
        let mut outcome = self.run(job, &listener, &token).instrument(span).await;

        // A result that lands after cancel() is stale
        if token.is_cancelled() && outcome != FetchOutcome::Cancelled {
            remove_partial(&job.destination).await;
            info!("Discarding result of cancelled download");
            outcome = FetchOutcome::Cancelled;
        }

        match &outcome {
            FetchOutcome::Completed(path) => listener.success(path),
            FetchOutcome::Failed(message) => listener.error(message),
            FetchOutcome::Cancelled => {}
        }
        outcome
    }

    async fn run(
        &self,
        job: &DownloadJob,
        listener: &GatedListener,
        token: &CancellationToken,
    ) -> FetchOutcome {
        let mut last_error: Option<FetchError> = None;

        for (source, url) in job.urls().into_iter().enumerate() {
            let source = if source == 0 { "primary" } else { "fallback" };

            for attempt in 1..=self.policy.max_attempts {
                debug!(source, url = %redact_url(url), attempt, "Download attempt");

                match self.attempt(url, job, listener, token).await {
                    Ok(bytes) => {
                        info!(source, attempt, bytes, "Download complete");
                        return FetchOutcome::Completed(job.destination.clone());
                    }
                    Err(FetchError::Cancelled) => {
                        remove_partial(&job.destination).await;
                        info!("Download cancelled");
                        return FetchOutcome::Cancelled;
                    }
                    Err(e) => {
                        remove_partial(&job.destination).await;
                        warn!(
                            source,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            error = %e,
                            "Download attempt failed"
                        );
                        last_error = Some(e);
                    }
                }

                if attempt < self.policy.max_attempts {
                    let delay = self.policy.base_delay.saturating_mul(attempt);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            info!("Download cancelled while waiting to retry");
                            return FetchOutcome::Cancelled;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        FetchOutcome::Failed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Download failed".to_string()),
        )
    }

    /// One transfer plus verification. Returns the number of bytes written.
    async fn attempt(
        &self,
        url: &str,
        job: &DownloadJob,
        listener: &GatedListener,
        token: &CancellationToken,
    ) -> Result<u64> {
        let request = HttpRequest::get(url).timeout(self.policy.request_timeout);
        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            result = self.http_client.download_stream(request) => result?,
        };

        if !stream.is_success() {
            return Err(FetchError::Http {
                status: stream.status,
            });
        }

        let expected_length = job
            .expected_length
            .or(stream.content_length)
            .filter(|length| *length > 0);

        if let Some(parent) = job.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&job.destination).await?;
        let mut body = stream.body;
        let mut buffer = vec![0u8; self.policy.chunk_size];
        let mut written: u64 = 0;

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                read = body.read(&mut buffer) => {
                    read.map_err(|e| FetchError::Transport(e.to_string()))?
                }
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).await?;
            written += read as u64;

            match expected_length {
                Some(total) => listener.progress(FetchProgress::Percent(percent(written, total))),
                None => listener.progress(FetchProgress::Indeterminate),
            }
        }

        file.flush().await?;
        drop(file);

        if expected_length.is_none() {
            listener.progress(FetchProgress::Percent(100));
        }

        let expectations = Expectations {
            length: expected_length,
            kind: job.kind,
            sha256: job.expected_sha256.as_deref(),
        };
        verify_download(&job.destination, &expectations).await?;

        Ok(written)
    }
}

fn percent(written: u64, total: u64) -> u8 {
    (written.saturating_mul(100) / total).min(100) as u8
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial download"),
    }
}
