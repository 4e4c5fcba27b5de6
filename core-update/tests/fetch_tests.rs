//! Integration tests for resilient fetch and mirror selection
//!
//! These tests run the fetcher against real HTTP servers (wiremock) and a
//! scripted client for cases a server cannot express (unknown length, a body
//! that never ends):
//! - Primary success, retry then fallback, integrity failure
//! - Progress reporting with and without a known length
//! - Cancellation mid-transfer
//! - Mirror choice and its 24 hour cache

use async_trait::async_trait;
use bridge_desktop::{ReqwestHttpClient, TokioTaskDispatcher};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream};
use bridge_traits::time::{Clock, ManualClock};
use chrono::Utc;
use core_runtime::config::{FetchPolicy, MirrorConfig};
use core_update::{
    Channel, DownloadJob, FetchEvent, FetchListener, FetchOutcome, FetchProgress, MirrorSelector,
    ReleaseSource, ResilientFetcher,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APK: &[u8] = b"PK\x03\x04 fake package body";

fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        base_delay: Duration::from_millis(10),
        ..FetchPolicy::default()
    }
}

fn fetcher(http: Arc<dyn HttpClient>) -> ResilientFetcher {
    ResilientFetcher::new(http, Arc::new(TokioTaskDispatcher::new()), fast_policy()).unwrap()
}

fn reqwest_client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new().unwrap())
}

fn listener() -> (Arc<dyn FetchListener>, mpsc::UnboundedReceiver<FetchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<FetchEvent>) -> Vec<FetchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Scripted client
// ============================================================================

enum Body {
    Bytes(&'static [u8]),
    Pipe(DuplexStream),
}

/// Answers every streamed request with the next scripted body
struct ScriptedClient {
    bodies: Mutex<Vec<Body>>,
    content_length: Option<u64>,
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("execute".to_string()))
    }

    async fn download_stream(&self, _request: HttpRequest) -> BridgeResult<HttpStream> {
        let body = self
            .bodies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| BridgeError::Transport("no more scripted bodies".to_string()))?;

        let body: Box<dyn tokio::io::AsyncRead + Send + Unpin> = match body {
            Body::Bytes(bytes) => Box::new(bytes),
            Body::Pipe(pipe) => Box::new(pipe),
        };
        Ok(HttpStream {
            status: 200,
            content_length: self.content_length,
            body,
        })
    }
}

// ============================================================================
// Fetch
// ============================================================================

#[tokio::test]
async fn test_primary_success_reports_progress_and_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apk/release/mobile.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(APK))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("update/mobile.apk");
    let job = DownloadJob::new(format!("{}/apk/release/mobile.apk", server.uri()), &destination)
        .with_expected_length(APK.len() as u64)
        .package();

    let (listener, mut rx) = listener();
    let outcome = fetcher(reqwest_client())
        .fetch(&job, listener, CancellationToken::new())
        .await;

    assert_eq!(outcome, FetchOutcome::Completed(destination.clone()));
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), APK);

    let events = drain(&mut rx);
    assert_eq!(
        events.iter().rev().nth(1),
        Some(&FetchEvent::Progress(FetchProgress::Percent(100)))
    );
    assert_eq!(events.last(), Some(&FetchEvent::Success(destination)));
}

#[tokio::test]
async fn test_primary_exhausts_retries_then_fallback_succeeds() {
    let primary = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&primary)
        .await;

    let fallback = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(APK))
        .expect(1)
        .mount(&fallback)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("mobile.apk");
    let job = DownloadJob::new(format!("{}/mobile.apk", primary.uri()), &destination)
        .with_fallback(format!("{}/mobile.apk", fallback.uri()))
        .package();

    let (listener, _rx) = listener();
    let outcome = fetcher(reqwest_client())
        .fetch(&job, listener, CancellationToken::new())
        .await;

    assert!(outcome.success());
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), APK);
}

#[tokio::test]
async fn test_fallback_equal_to_primary_is_not_tried_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/mobile.apk", server.uri());
    let job = DownloadJob::new(url.clone(), dir.path().join("mobile.apk")).with_fallback(url);

    let (listener, _rx) = listener();
    let outcome = fetcher(reqwest_client())
        .fetch(&job, listener, CancellationToken::new())
        .await;

    assert_eq!(outcome, FetchOutcome::Failed("Download failed: HTTP 503".to_string()));
}

#[tokio::test]
async fn test_declared_length_mismatch_deletes_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(APK))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("mobile.apk");
    let job = DownloadJob::new(format!("{}/mobile.apk", server.uri()), &destination)
        .with_expected_length(APK.len() as u64 + 5)
        .package();

    let (listener, _rx) = listener();
    let outcome = fetcher(reqwest_client())
        .fetch(&job, listener, CancellationToken::new())
        .await;

    let FetchOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("size mismatch"), "{}", message);
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_failed_verification_deletes_file_and_reports_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("mobile.apk");
    let job = DownloadJob::new(format!("{}/mobile.apk", server.uri()), &destination).package();

    let (listener, mut rx) = listener();
    let outcome = fetcher(reqwest_client())
        .fetch(&job, listener, CancellationToken::new())
        .await;

    let FetchOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("invalid package header"), "{}", message);
    assert!(!destination.exists());

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(FetchEvent::Error(_))));
}

#[tokio::test]
async fn test_unknown_length_reports_indeterminate_then_complete() {
    let client = ScriptedClient {
        bodies: Mutex::new(vec![Body::Bytes(b"{\"version\":3}")]),
        content_length: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("manifest.json");
    let job = DownloadJob::new("https://mirror.example/manifest.json", &destination);

    let (listener, mut rx) = listener();
    let outcome = fetcher(Arc::new(client))
        .fetch(&job, listener, CancellationToken::new())
        .await;
    assert!(outcome.success());

    let events = drain(&mut rx);
    assert_eq!(
        events.first(),
        Some(&FetchEvent::Progress(FetchProgress::Indeterminate))
    );
    assert_eq!(
        events.iter().rev().nth(1),
        Some(&FetchEvent::Progress(FetchProgress::Percent(100)))
    );
}

#[tokio::test]
async fn test_cancel_mid_transfer_removes_file_and_silences_callbacks() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let client = ScriptedClient {
        bodies: Mutex::new(vec![Body::Pipe(reader)]),
        content_length: Some(1_000_000),
    };

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("mobile.apk");
    let job = DownloadJob::new("https://mirror.example/mobile.apk", &destination).package();

    let (listener, mut rx) = listener();
    let handle = fetcher(Arc::new(client)).start(job, listener).unwrap();

    writer.write_all(b"PK\x03\x04partial").await.unwrap();
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, FetchEvent::Progress(FetchProgress::Percent(_))));

    handle.cancel();
    let outcome = handle.wait().await;

    assert_eq!(outcome, FetchOutcome::Cancelled);
    assert!(!destination.exists());
    assert!(drain(&mut rx)
        .iter()
        .all(|event| matches!(event, FetchEvent::Progress(_))));
    drop(writer);
}

/// Cancels the fetch as soon as the transfer reports completion
struct CancelAtCompletion {
    token: CancellationToken,
    events: mpsc::UnboundedSender<FetchEvent>,
}

impl FetchListener for CancelAtCompletion {
    fn on_progress(&self, progress: FetchProgress) {
        if progress == FetchProgress::Percent(100) {
            self.token.cancel();
        }
        self.events.on_progress(progress);
    }

    fn on_success(&self, path: &std::path::Path) {
        self.events.on_success(path);
    }

    fn on_error(&self, message: &str) {
        self.events.on_error(message);
    }
}

#[tokio::test]
async fn test_result_arriving_after_cancel_is_discarded() {
    let client = ScriptedClient {
        bodies: Mutex::new(vec![Body::Bytes(b"{\"version\":3}")]),
        content_length: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("manifest.json");
    let job = DownloadJob::new("https://mirror.example/manifest.json", &destination);

    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Arc::new(CancelAtCompletion {
        token: token.clone(),
        events: tx,
    });

    let outcome = fetcher(Arc::new(client)).fetch(&job, listener, token).await;

    assert_eq!(outcome, FetchOutcome::Cancelled);
    assert!(!destination.exists());
    assert!(!drain(&mut rx)
        .iter()
        .any(|event| matches!(event, FetchEvent::Success(_))));
}

#[tokio::test]
async fn test_fetcher_rejects_invalid_policy() {
    let policy = FetchPolicy {
        max_attempts: 0,
        ..FetchPolicy::default()
    };
    assert!(ResilientFetcher::new(
        reqwest_client(),
        Arc::new(TokioTaskDispatcher::new()),
        policy
    )
    .is_err());
}

// ============================================================================
// Mirror selection
// ============================================================================

async fn mirror(status: u16, delay: Duration, expected_probes: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/README.md"))
        .respond_with(ResponseTemplate::new(status).set_delay(delay))
        .expect(expected_probes)
        .mount(&server)
        .await;
    server
}

fn selector(primary: &MockServer, alternate: &MockServer, clock: Arc<dyn Clock>) -> MirrorSelector {
    MirrorSelector::new(
        reqwest_client(),
        clock,
        MirrorConfig {
            primary_base: primary.uri(),
            alternate_base: alternate.uri(),
            probe_timeout: Duration::from_secs(2),
            ..MirrorConfig::default()
        },
    )
}

#[tokio::test]
async fn test_faster_mirror_wins_and_is_cached_for_a_day() {
    let primary = mirror(200, Duration::from_millis(400), 2).await;
    let alternate = mirror(200, Duration::ZERO, 2).await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let selector = selector(&primary, &alternate, clock.clone());

    assert!(selector.should_use_alternate().await);

    clock.advance(Duration::from_secs(23 * 60 * 60));
    assert!(selector.should_use_alternate().await);

    clock.advance(Duration::from_secs(2 * 60 * 60));
    assert!(selector.should_use_alternate().await);
}

#[tokio::test]
async fn test_only_working_mirror_is_chosen() {
    let primary = mirror(404, Duration::ZERO, 1).await;
    let alternate = mirror(200, Duration::from_millis(300), 1).await;
    let selector = selector(&primary, &alternate, Arc::new(ManualClock::new(Utc::now())));

    assert!(selector.should_use_alternate().await);
    assert_eq!(selector.active_base().await, alternate.uri());
}

#[tokio::test]
async fn test_both_mirrors_down_defaults_to_primary() {
    let primary = mirror(500, Duration::ZERO, 1).await;
    let alternate = mirror(500, Duration::ZERO, 1).await;
    let selector = selector(&primary, &alternate, Arc::new(ManualClock::new(Utc::now())));

    assert!(!selector.should_use_alternate().await);
}

#[tokio::test]
async fn test_release_job_prefers_selected_mirror_and_falls_back_to_other() {
    let primary = mirror(503, Duration::ZERO, 1).await;
    let alternate = mirror(200, Duration::ZERO, 1).await;
    let selector = Arc::new(selector(
        &primary,
        &alternate,
        Arc::new(ManualClock::new(Utc::now())),
    ));
    let source = ReleaseSource::new(selector);

    let job = source
        .package_job(Channel::Release, "mobile-arm64_v8a", "/tmp/mobile.apk")
        .await;

    assert_eq!(
        job.primary_url,
        format!("{}/apk/release/mobile-arm64_v8a.apk", alternate.uri())
    );
    assert_eq!(
        job.fallback_url,
        Some(format!("{}/apk/release/mobile-arm64_v8a.apk", primary.uri()))
    );
    assert_eq!(
        source.manifest_url(Channel::Dev, "mobile-arm64_v8a").await,
        format!("{}/apk/dev/mobile-arm64_v8a.json", alternate.uri())
    );
}
