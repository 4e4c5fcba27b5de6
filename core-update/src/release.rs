//! Release artifact URLs.
//!
//! Artifacts live under `apk/{channel}/` on both mirrors:
//!
//! ```text
//! {base}/apk/release/{name}.json   manifest
//! {base}/apk/release/{name}.apk    package
//! ```
//!
//! GitHub URLs can also be rewritten to the jsDelivr CDN, which is often
//! reachable where GitHub is not.

use std::sync::Arc;
use tracing::debug;

use crate::fetch::DownloadJob;
use crate::mirror::MirrorSelector;

const JSDELIVR_GH: &str = "https://cdn.jsdelivr.net/gh";
const RAW_HOST: &str = "raw.githubusercontent.com/";
const RELEASE_SEGMENT: &str = "/releases/download/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Release,
    Dev,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Release => "release",
            Channel::Dev => "dev",
        }
    }
}

/// Builds artifact URLs against whichever mirror is preferred
pub struct ReleaseSource {
    selector: Arc<MirrorSelector>,
}

impl ReleaseSource {
    pub fn new(selector: Arc<MirrorSelector>) -> Self {
        Self { selector }
    }

    pub async fn manifest_url(&self, channel: Channel, name: &str) -> String {
        artifact_url(self.selector.active_base().await, channel, name, "json")
    }

    pub async fn package_url(&self, channel: Channel, name: &str) -> String {
        artifact_url(self.selector.active_base().await, channel, name, "apk")
    }

    /// Download job for a package: preferred mirror first, the other as fallback
    pub async fn package_job(
        &self,
        channel: Channel,
        name: &str,
        destination: impl Into<std::path::PathBuf>,
    ) -> DownloadJob {
        let primary = self.package_url(channel, name).await;
        let fallback = artifact_url(self.selector.standby_base().await, channel, name, "apk");
        DownloadJob::new(primary, destination)
            .with_fallback(fallback)
            .package()
    }
}

fn artifact_url(base: &str, channel: Channel, name: &str, extension: &str) -> String {
    format!(
        "{}/apk/{}/{}.{}",
        base.trim_end_matches('/'),
        channel.as_str(),
        name,
        extension
    )
}

/// Rewrite a GitHub release-download or raw URL to jsDelivr.
///
/// ```text
/// https://github.com/{owner}/{repo}/releases/download/{tag}/{file}
///   → https://cdn.jsdelivr.net/gh/{owner}/{repo}@{tag}/{file}
/// https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}
///   → https://cdn.jsdelivr.net/gh/{owner}/{repo}@main/{path}
/// ```
///
/// Anything else comes back unchanged.
pub fn to_jsdelivr(url: &str) -> String {
    let converted = release_to_jsdelivr(url).or_else(|| raw_to_jsdelivr(url));
    match converted {
        Some(cdn) => {
            debug!(from = url, to = %cdn, "Rewrote URL to jsDelivr");
            cdn
        }
        None => url.to_string(),
    }
}

fn release_to_jsdelivr(url: &str) -> Option<String> {
    let (repo_url, rest) = url.split_once(RELEASE_SEGMENT)?;
    let mut repo_parts = repo_url.trim_end_matches('/').rsplit('/');
    let repo = repo_parts.next().filter(|s| !s.is_empty())?;
    let owner = repo_parts.next().filter(|s| !s.is_empty())?;

    let (tag, file) = rest.split_once('/')?;
    if tag.is_empty() || file.is_empty() {
        return None;
    }

    Some(format!("{}/{}/{}@{}/{}", JSDELIVR_GH, owner, repo, tag, file))
}

fn raw_to_jsdelivr(url: &str) -> Option<String> {
    let start = url.find(RAW_HOST)? + RAW_HOST.len();
    let mut parts = url[start..].splitn(4, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let _branch = parts.next()?;
    let path = parts.next().filter(|s| !s.is_empty())?;

    Some(format!("{}/{}/{}@main/{}", JSDELIVR_GH, owner, repo, path))
}
