//! Velero resource types and API
//!
//! Typed structs for the Velero `BackupStorageLocation` custom resource,
//! applied through a `DynamicObject` API with server-side apply. The
//! resource is typed on our side for construction and tests; on the wire it
//! is just the CRD's JSON, so no generated client is needed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::FIELD_MANAGER;
use crate::error::Error;

/// Velero BackupStorageLocation resource
///
/// Defines where backups are stored and how to reach that storage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocation {
    /// API version
    #[serde(default = "BackupStorageLocation::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "BackupStorageLocation::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// BSL specification
    pub spec: BackupStorageLocationSpec,
}

impl BackupStorageLocation {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "BackupStorageLocation";

    fn default_api_version() -> String {
        Self::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        Self::KIND.to_string()
    }

    /// Create a new BackupStorageLocation
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: BackupStorageLocationSpec,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec,
        }
    }

    fn api_resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("velero.io", "v1", Self::KIND))
    }
}

/// BackupStorageLocation spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocationSpec {
    /// Provider name (aws for any S3-compatible store)
    pub provider: String,
    /// Object storage configuration
    pub object_storage: ObjectStorageLocation,
    /// Provider-specific configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    /// Credential reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<VeleroCredential>,
    /// Whether this is the default BSL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Object storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageLocation {
    /// Bucket name
    pub bucket: String,
    /// Prefix within the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Velero credential reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VeleroCredential {
    /// Name of the Kubernetes Secret
    pub name: String,
    /// Key within the Secret
    pub key: String,
}

/// Backup storage location operations used by the executors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackupLocationApi: Send + Sync {
    /// Create or update a backup storage location (idempotent)
    async fn ensure_location(&self, location: &BackupStorageLocation) -> Result<(), Error>;

    /// The location's reported status phase, if the resource exists and has
    /// been reconciled
    async fn location_phase(&self, namespace: &str, name: &str)
        -> Result<Option<String>, Error>;

    /// Delete a backup storage location; already absent is a no-op
    async fn delete_location(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// kube-rs backed [`BackupLocationApi`] over the Velero CRD
#[derive(Clone)]
pub struct VeleroApi {
    client: Client,
}

impl VeleroApi {
    /// Create a Velero API over an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn location_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &BackupStorageLocation::api_resource(),
        )
    }
}

/// Extract `.status.phase` from a raw custom resource body
fn phase_of(data: &serde_json::Value) -> Option<String> {
    data.pointer("/status/phase")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl BackupLocationApi for VeleroApi {
    async fn ensure_location(&self, location: &BackupStorageLocation) -> Result<(), Error> {
        let name = location.metadata.name.as_deref().unwrap_or_default();
        let namespace = location.metadata.namespace.as_deref().unwrap_or_default();
        let api = self.location_api(namespace);

        let value = serde_json::to_value(location).map_err(|e| {
            Error::validation(format!("unserializable backup storage location: {}", e))
        })?;

        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&value),
        )
        .await
        .map_err(|e| Error::kube("apply backup storage location", e))?;

        debug!(namespace = %namespace, name = %name, "Applied backup storage location");
        Ok(())
    }

    async fn location_phase(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error> {
        let api = self.location_api(namespace);
        match api.get(name).await {
            Ok(obj) => Ok(phase_of(&obj.data)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(e) => Err(Error::kube("get backup storage location", e)),
        }
    }

    async fn delete_location(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.location_api(namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(namespace = %namespace, name = %name, "Location already absent");
                Ok(())
            }
            Err(e) => Err(Error::kube("delete backup storage location", e)),
        }
    }
}
