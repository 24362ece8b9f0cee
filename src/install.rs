//! Install executor
//!
//! Runs the ordered installation sequence for a resolved strategy. Only the
//! package install/upgrade step is fatal; every other step failure is
//! logged, recorded in the result's step ledger, and the install proceeds,
//! because the subsystem can usually self-heal once the release is in
//! place. Cancellation is the exception: it aborts the remaining steps no
//! matter which step observed it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Error;
use crate::orchestrator::Orchestrator;
use crate::readiness::wait_for;
use crate::retry::retry_fixed;
use crate::storage::StorageSpec;
use crate::velero::{
    BackupStorageLocation, BackupStorageLocationSpec, ObjectStorageLocation, VeleroCredential,
};
use crate::{CREDENTIAL_SECRET_KEY, CREDENTIAL_SECRET_NAME};

/// An install request: where to install and how to reach backup storage
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Target namespace for the subsystem
    pub namespace: String,
    /// Force a teardown-and-reinstall even if the deployment looks healthy
    pub force: bool,
    /// Object storage the subsystem will back up to
    pub storage: StorageSpec,
}

impl InstallRequest {
    /// Validate the request before any cluster interaction
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.trim().is_empty() {
            return Err(Error::validation("namespace must not be empty"));
        }
        if self.storage.endpoint.trim().is_empty() {
            return Err(Error::validation("storage endpoint must not be empty"));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(Error::validation("storage bucket must not be empty"));
        }
        if self.storage.access_key.is_empty() || self.storage.secret_key.is_empty() {
            return Err(Error::validation("storage credentials must not be empty"));
        }
        Ok(())
    }
}

/// An uninstall request
#[derive(Debug, Clone)]
pub struct UninstallRequest {
    /// Namespace the subsystem was installed into
    pub namespace: String,
    /// Continue past step failures instead of aborting
    pub force: bool,
}

impl UninstallRequest {
    /// Validate the request before any cluster interaction
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.trim().is_empty() {
            return Err(Error::validation("namespace must not be empty"));
        }
        Ok(())
    }
}

/// Overall status of an install call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// Steps are still executing
    InProgress,
    /// The sequence completed; warnings may still be present in the details
    Success,
}

/// Outcome of one install step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Step name
    pub step: String,
    /// Whether the step succeeded
    pub ok: bool,
    /// Success note or the failure it was recorded with
    pub message: String,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Result of an install call, built up as steps complete
#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    /// Overall status
    pub status: InstallStatus,
    /// Human-readable summary
    pub message: String,
    /// Target namespace echoed from the request
    pub namespace: String,
    /// Force flag echoed from the request
    pub force: bool,
    /// Whether the object store answered the connectivity probe
    pub storage_reachable: bool,
    /// Name of the backup storage location that was ensured
    pub storage_location: String,
    /// Wall-clock duration of the call, in seconds
    #[serde(serialize_with = "serialize_secs", rename = "elapsed_seconds")]
    pub elapsed: Duration,
    /// Per-step outcomes, in execution order
    pub details: Vec<StepOutcome>,
}

impl InstallResult {
    fn in_progress(request: &InstallRequest, location: &str) -> Self {
        Self {
            status: InstallStatus::InProgress,
            message: String::new(),
            namespace: request.namespace.clone(),
            force: request.force,
            storage_reachable: false,
            storage_location: location.to_string(),
            elapsed: Duration::ZERO,
            details: Vec::new(),
        }
    }

    pub(crate) fn already_healthy(request: &InstallRequest, location: &str, elapsed: Duration) -> Self {
        Self {
            status: InstallStatus::Success,
            message: "already healthy, nothing to do".to_string(),
            namespace: request.namespace.clone(),
            force: request.force,
            storage_reachable: false,
            storage_location: location.to_string(),
            elapsed,
            details: Vec::new(),
        }
    }

    fn record(&mut self, step: &str, ok: bool, message: impl Into<String>) {
        self.details.push(StepOutcome {
            step: step.to_string(),
            ok,
            message: message.into(),
        });
    }

    /// Record a non-fatal step outcome; only cancellation escapes as an error
    fn note(&mut self, step: &str, outcome: Result<(), Error>) -> Result<(), Error> {
        match outcome {
            Ok(()) => {
                self.record(step, true, "ok");
                Ok(())
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(step = %step, error = %e, "Install step failed, continuing");
                self.record(step, false, e.to_string());
                Ok(())
            }
        }
    }
}

/// Helm values for the subsystem chart
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartValues {
    image: ImageValues,
    credentials: CredentialValues,
    configuration: ConfigurationValues,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageValues {
    repository: String,
    tag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialValues {
    existing_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationValues {
    backup_storage_location: Vec<LocationValues>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationValues {
    name: String,
    provider: String,
    bucket: String,
    default: bool,
    config: BTreeMap<String, String>,
}

/// Provider config shared by the chart values and the BSL resource
fn s3_config(storage: &StorageSpec) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    config.insert(
        "region".to_string(),
        storage.region.clone().unwrap_or_else(|| "minio".to_string()),
    );
    config.insert("s3Url".to_string(), storage.endpoint.clone());
    config.insert("s3ForcePathStyle".to_string(), "true".to_string());
    if storage.skip_tls_verify {
        config.insert("insecureSkipTLSVerify".to_string(), "true".to_string());
    }
    config
}

impl Orchestrator {
    fn chart_values(&self, request: &InstallRequest) -> Result<serde_json::Value, Error> {
        let (repository, tag) = match self.config.image.rsplit_once(':') {
            Some((repo, tag)) => (repo.to_string(), tag.to_string()),
            None => (self.config.image.clone(), "latest".to_string()),
        };

        let values = ChartValues {
            image: ImageValues { repository, tag },
            credentials: CredentialValues {
                existing_secret: CREDENTIAL_SECRET_NAME.to_string(),
            },
            configuration: ConfigurationValues {
                backup_storage_location: vec![LocationValues {
                    name: self.config.location_name.clone(),
                    provider: "aws".to_string(),
                    bucket: request.storage.bucket.clone(),
                    default: true,
                    config: s3_config(&request.storage),
                }],
            },
        };

        serde_json::to_value(values)
            .map_err(|e| Error::validation(format!("unserializable chart values: {}", e)))
    }

    fn backup_location(&self, request: &InstallRequest) -> BackupStorageLocation {
        BackupStorageLocation::new(
            self.config.location_name.clone(),
            request.namespace.clone(),
            BackupStorageLocationSpec {
                provider: "aws".to_string(),
                object_storage: ObjectStorageLocation {
                    bucket: request.storage.bucket.clone(),
                    prefix: None,
                },
                config: s3_config(&request.storage),
                credential: Some(VeleroCredential {
                    name: CREDENTIAL_SECRET_NAME.to_string(),
                    key: CREDENTIAL_SECRET_KEY.to_string(),
                }),
                default: Some(true),
            },
        )
    }

    /// Wait out the stabilization delay after a forced cleanup
    pub(crate) async fn stabilize(&self, cancel: &CancellationToken) -> Result<(), Error> {
        info!(
            delay_secs = self.config.stabilization_delay.as_secs(),
            "Waiting for control plane to settle after cleanup"
        );
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled("stabilization wait")),
            _ = tokio::time::sleep(self.config.stabilization_delay) => Ok(()),
        }
    }

    /// Run the fresh-install step sequence
    pub(crate) async fn fresh_install(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<InstallResult, Error> {
        let release = self.config.release_name.as_str();
        let namespace = request.namespace.as_str();
        let retry = &self.config.retry;
        let mut result = InstallResult::in_progress(request, &self.config.location_name);

        info!(namespace = %namespace, release = %release, "Starting fresh install");

        // 1. target namespace
        let outcome = retry_fixed(retry, "ensure namespace", cancel, || {
            self.cluster.ensure_namespace(namespace)
        })
        .await;
        result.note("ensure namespace", outcome)?;

        // 2. credential secret
        let credentials = request.storage.aws_credentials_file();
        let outcome = retry_fixed(retry, "ensure credential secret", cancel, || {
            let mut data = BTreeMap::new();
            data.insert(CREDENTIAL_SECRET_KEY.to_string(), credentials.clone());
            self.cluster
                .ensure_secret(namespace, CREDENTIAL_SECRET_NAME, data)
        })
        .await;
        result.note("ensure credential secret", outcome)?;

        // 3. guard against read-after-write lag, single attempt
        let outcome = match self.cluster.namespace_exists(namespace).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::validation(format!(
                "namespace {} not yet visible",
                namespace
            ))),
            Err(e) => Err(e),
        };
        result.note("verify namespace visible", outcome)?;

        // 4. package install or upgrade; the one fatal step
        let values = self.chart_values(request)?;
        let outcome = retry_fixed(retry, "install package", cancel, || {
            let values = values.clone();
            async move {
                if self.package.is_installed(release).await? {
                    self.package
                        .upgrade(release, &self.config.chart, namespace, &values)
                        .await
                } else {
                    self.package
                        .install(release, &self.config.chart, namespace, &values)
                        .await
                }
            }
        })
        .await;
        match outcome {
            Ok(()) => result.record("install package", true, "ok"),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Err(Error::fatal_install_step("install package", e)),
        }

        // 5. pod readiness; a timeout is a warning, not a failure
        let outcome = wait_for(&self.config.readiness, "subsystem pods running", cancel, || {
            async move {
                let pods = self.cluster.list_pods(namespace).await?;
                Ok(pods
                    .iter()
                    .any(|pod| pod.name.starts_with(release) && pod.phase == "Running"))
            }
        })
        .await;
        result.note("wait for pods", outcome)?;

        // 6. backup storage location
        let location = self.backup_location(request);
        let outcome = retry_fixed(retry, "ensure storage location", cancel, || {
            self.locations.ensure_location(&location)
        })
        .await;
        result.note("ensure storage location", outcome)?;

        // 7. end-to-end storage validation, single attempt
        match self.storage.verify_bucket(&request.storage).await {
            Ok(reachable) => {
                result.storage_reachable = reachable;
                let message = if reachable {
                    "bucket reachable".to_string()
                } else {
                    format!("bucket {} not found", request.storage.bucket)
                };
                result.record("probe object storage", reachable, message);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Object storage probe failed");
                result.record("probe object storage", false, e.to_string());
            }
        }
        let outcome = match self
            .locations
            .location_phase(namespace, &self.config.location_name)
            .await
        {
            Ok(Some(phase)) if phase == "Available" => Ok(()),
            Ok(Some(phase)) => Err(Error::validation(format!(
                "storage location phase is {}",
                phase
            ))),
            Ok(None) => Err(Error::validation("storage location not yet reconciled")),
            Err(e) => Err(e),
        };
        result.note("verify storage location", outcome)?;

        result.status = InstallStatus::Success;
        result.message = "installation complete".to_string();
        result.elapsed = started.elapsed();
        info!(
            namespace = %namespace,
            warnings = result.details.iter().filter(|d| !d.ok).count(),
            "Install sequence finished"
        );
        Ok(result)
    }
}
