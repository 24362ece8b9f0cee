//! Orchestrator façade
//!
//! Coordinates strategy resolution and the install/cleanup executors over
//! the four collaborator interfaces. The orchestrator holds no state
//! between calls: every install re-derives the health snapshot from the
//! live cluster, so concurrent calls against different namespaces are safe
//! without coordination.

use std::sync::Arc;
use std::time::Instant;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::{ClusterApi, KubeCluster};
use crate::config::OrchestratorConfig;
use crate::error::Error;
use crate::helm::{HelmCli, PackageApi};
use crate::install::{InstallRequest, InstallResult, UninstallRequest};
use crate::status::{self, HealthSnapshot};
use crate::storage::{MinioStorage, ObjectStorageApi};
use crate::strategy::Strategy;
use crate::velero::{BackupLocationApi, VeleroApi};

/// The public orchestration service for the backup subsystem
pub struct Orchestrator {
    pub(crate) cluster: Arc<dyn ClusterApi>,
    pub(crate) package: Arc<dyn PackageApi>,
    pub(crate) locations: Arc<dyn BackupLocationApi>,
    pub(crate) storage: Arc<dyn ObjectStorageApi>,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit collaborators
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        package: Arc<dyn PackageApi>,
        locations: Arc<dyn BackupLocationApi>,
        storage: Arc<dyn ObjectStorageApi>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cluster,
            package,
            locations,
            storage,
            config,
        }
    }

    /// Assemble an orchestrator over a kube client with the default
    /// collaborator implementations
    pub fn from_client(client: Client, config: OrchestratorConfig) -> Self {
        Self::new(
            Arc::new(KubeCluster::new(client.clone())),
            Arc::new(HelmCli::new(client.clone())),
            Arc::new(VeleroApi::new(client)),
            Arc::new(MinioStorage::new()),
            config,
        )
    }

    /// Resolve the install strategy for a request from the live cluster
    /// state.
    ///
    /// A snapshot that cannot be computed aborts before any mutation;
    /// "could not determine" is never conflated with "not installed".
    pub async fn determine_strategy(
        &self,
        request: &InstallRequest,
    ) -> Result<(Strategy, HealthSnapshot), Error> {
        request.validate()?;

        let snapshot = status::inspect(
            self.cluster.as_ref(),
            self.package.as_ref(),
            &self.config.release_name,
            &request.namespace,
        )
        .await
        .map_err(Error::strategy)?;

        let strategy = Strategy::resolve(snapshot, request.force);
        info!(
            namespace = %request.namespace,
            strategy = %strategy,
            healthy = snapshot.is_healthy,
            "Resolved install strategy"
        );
        Ok((strategy, snapshot))
    }

    /// Bring the backup subsystem to a running state in the request's
    /// namespace.
    ///
    /// Returns a result even when individual steps warned; only a failed
    /// package install, a failed strategy decision, or cancellation yield a
    /// hard error.
    pub async fn install(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
    ) -> Result<InstallResult, Error> {
        let started = Instant::now();
        let (strategy, _) = self.determine_strategy(request).await?;

        match strategy {
            Strategy::SkipInstall => Ok(InstallResult::already_healthy(
                request,
                &self.config.location_name,
                started.elapsed(),
            )),
            Strategy::ForceReinstall => {
                // force mode never fails; cancellation is the one exception
                self.run_cleanup(&request.namespace, true, cancel).await?;
                self.stabilize(cancel).await?;
                self.fresh_install(request, cancel, started).await
            }
            Strategy::FreshInstall => self.fresh_install(request, cancel, started).await,
        }
    }

    /// Tear the subsystem down per the request's force flag
    pub async fn uninstall(
        &self,
        request: &UninstallRequest,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        request.validate()?;
        self.run_cleanup(&request.namespace, request.force, cancel)
            .await
    }

    /// Tear the subsystem down from a namespace
    pub async fn cleanup(
        &self,
        namespace: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if namespace.trim().is_empty() {
            return Err(Error::validation("namespace must not be empty"));
        }
        self.run_cleanup(namespace, force, cancel).await
    }
}
