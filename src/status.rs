//! Deployment health inspection
//!
//! A point-in-time snapshot of the backup subsystem's health: whether its
//! pods are running in the target namespace and whether the package release
//! exists. Strategy resolution consumes the snapshot; it never re-queries.

use serde::Serialize;
use tracing::debug;

use crate::cluster::ClusterApi;
use crate::error::Error;
use crate::helm::PackageApi;

/// Point-in-time health of the backup subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// At least one of the subsystem's pods is in the Running phase
    pub pods_running: bool,
    /// The package release exists in some namespace
    pub package_released: bool,
    /// Both of the above
    pub is_healthy: bool,
}

impl HealthSnapshot {
    /// Build a snapshot; health is the conjunction of both signals
    pub fn new(pods_running: bool, package_released: bool) -> Self {
        Self {
            pods_running,
            package_released,
            is_healthy: pods_running && package_released,
        }
    }
}

/// Take a health snapshot of a release in a namespace.
///
/// A pod counts when its name carries the release prefix and its phase is
/// Running. Query failures propagate; health is never guessed.
pub async fn inspect(
    cluster: &dyn ClusterApi,
    package: &dyn PackageApi,
    release: &str,
    namespace: &str,
) -> Result<HealthSnapshot, Error> {
    let pods = cluster.list_pods(namespace).await?;
    let pods_running = pods
        .iter()
        .any(|pod| pod.name.starts_with(release) && pod.phase == "Running");

    let package_released = package.is_installed(release).await?;

    let snapshot = HealthSnapshot::new(pods_running, package_released);
    debug!(
        namespace = %namespace,
        release = %release,
        pods_running = snapshot.pods_running,
        package_released = snapshot.package_released,
        "Health snapshot taken"
    );
    Ok(snapshot)
}
