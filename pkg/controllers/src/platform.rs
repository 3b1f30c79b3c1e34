use pkg_constants::api::{OPENSHIFT_VERSION_PATH, VERSION_PATH};
use pkg_state::VersionSource;
use pkg_types::platform::{Platform, ServerVersion};
use pkg_types::psmdb::PerconaServerMongoDB;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Works out which platform flavor the operator runs on.
///
/// Detection happens once; later calls return the cached answer.
pub struct PlatformDetector<S> {
    source: S,
    cached: OnceCell<ServerVersion>,
}

impl<S: VersionSource> PlatformDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> Result<&ServerVersion> {
        self.cached
            .get_or_try_init(|| detect(&self.source))
            .await
    }

    /// Like [`resolve`](Self::resolve), but falls back to plain Kubernetes.
    /// A failed detection is retried on the next call.
    pub async fn resolve_or_default(&self) -> ServerVersion {
        match self.resolve().await {
            Ok(version) => {
                info!(
                    "Detected platform {} (gitVersion={})",
                    version.platform,
                    version.git_version().unwrap_or("unknown")
                );
                version.clone()
            }
            Err(e) => {
                warn!("{}; assuming {}", e, Platform::default());
                ServerVersion::default()
            }
        }
    }
}

/// `/version` answers on any conformant server; `/version/openshift` only on
/// OpenShift. Both may be hidden (404/401/403) without that being an error.
async fn detect<S: VersionSource + ?Sized>(source: &S) -> Result<ServerVersion> {
    let mut version = ServerVersion::default();

    for (path, platform) in [
        (VERSION_PATH, Platform::Kubernetes),
        (OPENSHIFT_VERSION_PATH, Platform::Openshift),
    ] {
        match source.get_raw(path).await {
            Ok(body) => {
                merge_info(&mut version.info, path, &body)?;
                version.platform = platform;
            }
            Err(e) if e.is_absent_or_denied() => {}
            Err(e) => return Err(Error::PlatformResolutionFailed(e)),
        }
    }

    Ok(version)
}

fn merge_info(info: &mut Map<String, Value>, path: &str, body: &[u8]) -> Result<()> {
    if body.is_empty() {
        return Ok(());
    }
    let parsed: Map<String, Value> =
        serde_json::from_slice(body).map_err(|source| Error::MalformedVersion {
            path: path.to_string(),
            source,
        })?;
    info.extend(parsed);
    Ok(())
}

/// A platform named in the topology spec wins over the detected one.
pub fn effective_platform(topology: &PerconaServerMongoDB, version: &ServerVersion) -> Platform {
    topology.spec.platform.unwrap_or(version.platform)
}
