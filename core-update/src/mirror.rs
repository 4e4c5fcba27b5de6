//! # Mirror Selector
//!
//! Picks between two equivalent read endpoints by probing both.
//!
//! The decision is cached for [`MirrorConfig::validity`]. Concurrent callers
//! that find the cache stale may all probe; the last one to finish wins.

use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::config::MirrorConfig;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct Decision {
    use_alternate: bool,
    measured_at: DateTime<Utc>,
}

/// Which endpoint answered and how fast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub primary: Option<Duration>,
    pub alternate: Option<Duration>,
}

impl ProbeResult {
    /// Faster of two working endpoints, else the working one, else primary
    pub fn prefers_alternate(&self) -> bool {
        match (self.primary, self.alternate) {
            (Some(primary), Some(alternate)) => alternate < primary,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

pub struct MirrorSelector {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    config: MirrorConfig,
    cached: RwLock<Option<Decision>>,
}

impl MirrorSelector {
    pub fn new(http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>, config: MirrorConfig) -> Self {
        Self {
            http_client,
            clock,
            config,
            cached: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Whether reads should go to the alternate endpoint
    pub async fn should_use_alternate(&self) -> bool {
        if let Some(use_alternate) = self.fresh_decision() {
            return use_alternate;
        }

        let result = self.probe_both().await;
        let use_alternate = result.prefers_alternate();

        if result.primary.is_none() && result.alternate.is_none() {
            warn!("Both mirrors failed their probe; using primary");
        } else {
            info!(
                primary_ms = result.primary.map(|d| d.as_millis() as u64),
                alternate_ms = result.alternate.map(|d| d.as_millis() as u64),
                use_alternate,
                "Mirror selected"
            );
        }

        let decision = Decision {
            use_alternate,
            measured_at: self.clock.now(),
        };
        match self.cached.write() {
            Ok(mut cached) => *cached = Some(decision),
            Err(poisoned) => *poisoned.into_inner() = Some(decision),
        }

        use_alternate
    }

    /// Base URL of the endpoint currently preferred
    pub async fn active_base(&self) -> &str {
        if self.should_use_alternate().await {
            &self.config.alternate_base
        } else {
            &self.config.primary_base
        }
    }

    /// Base URL of the endpoint not currently preferred
    pub async fn standby_base(&self) -> &str {
        if self.should_use_alternate().await {
            &self.config.primary_base
        } else {
            &self.config.alternate_base
        }
    }

    /// Forget the cached decision so the next call probes again
    pub fn invalidate(&self) {
        match self.cached.write() {
            Ok(mut cached) => *cached = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn fresh_decision(&self) -> Option<bool> {
        let cached = match self.cached.read() {
            Ok(cached) => *cached,
            Err(poisoned) => *poisoned.into_inner(),
        }?;

        let validity = chrono::Duration::from_std(self.config.validity).ok()?;
        let age = self.clock.now().signed_duration_since(cached.measured_at);
        (age >= chrono::Duration::zero() && age < validity).then_some(cached.use_alternate)
    }

    async fn probe_both(&self) -> ProbeResult {
        let (primary, alternate) = tokio::join!(
            self.probe(&self.config.primary_base),
            self.probe(&self.config.alternate_base)
        );
        ProbeResult { primary, alternate }
    }

    /// Latency of a successful probe, `None` on failure or timeout
    async fn probe(&self, base: &str) -> Option<Duration> {
        let url = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.config.probe_path.trim_start_matches('/')
        );
        let request = HttpRequest::get(url.as_str()).timeout(self.config.probe_timeout);

        let started = Instant::now();
        let result =
            tokio::time::timeout(self.config.probe_timeout, self.http_client.execute(request)).await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(response)) if response.is_success() => {
                debug!(url = %url, elapsed_ms = elapsed.as_millis() as u64, "Mirror probe ok");
                Some(elapsed)
            }
            Ok(Ok(response)) => {
                debug!(url = %url, status = response.status, "Mirror probe rejected");
                None
            }
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "Mirror probe failed");
                None
            }
            Err(_) => {
                debug!(url = %url, "Mirror probe timed out");
                None
            }
        }
    }
}
