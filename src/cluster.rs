//! Cluster resource API
//!
//! Narrow capability interface over the Kubernetes resources the
//! orchestrator touches: namespaces, secrets, pods, and the subsystem's
//! cluster-scoped CRDs. The kube-rs implementation uses server-side apply
//! for ensures so "already exists" can never fail, and maps 404s on deletes
//! to no-ops so teardown is idempotent.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::error::Error;

/// Field manager used for server-side apply
pub(crate) const FIELD_MANAGER: &str = "velero-orchestrator";

/// A pod's identity and lifecycle phase, as much as the orchestrator needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    /// Pod name
    pub name: String,
    /// Pod phase (Pending, Running, Succeeded, Failed, Unknown)
    pub phase: String,
}

/// Cluster resource operations used by the executors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Ensure a namespace exists (idempotent)
    async fn ensure_namespace(&self, name: &str) -> Result<(), Error>;

    /// Whether a namespace is currently visible
    async fn namespace_exists(&self, name: &str) -> Result<bool, Error>;

    /// Delete a namespace; an already-absent namespace is a no-op
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    /// Create or update an Opaque secret with the given string data
    async fn ensure_secret(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error>;

    /// Delete a secret; an already-absent secret is a no-op
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// List pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, Error>;

    /// Delete a cluster-scoped CRD by name; already absent is a no-op
    async fn delete_crd(&self, name: &str) -> Result<(), Error>;
}

/// kube-rs backed [`ClusterApi`]
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Create a cluster API over an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Treat 404 as success for delete-style operations
fn ignore_not_found(operation: &str, err: kube::Error) -> Result<(), Error> {
    match err {
        kube::Error::Api(ref response) if response.code == 404 => {
            debug!(operation = %operation, "Resource already absent");
            Ok(())
        }
        other => Err(Error::kube(operation, other)),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
            .await
            .map_err(|e| Error::kube("ensure namespace", e))?;
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(e) => Err(Error::kube("get namespace", e)),
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => ignore_not_found("delete namespace", e),
        }
    }

    async fn ensure_secret(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": name, "namespace": namespace },
            "type": "Opaque",
            "stringData": data,
        });
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await
        .map_err(|e| Error::kube("ensure secret", e))?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => ignore_not_found("delete secret", e),
        }
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::kube("list pods", e))?;

        Ok(pods
            .items
            .into_iter()
            .map(|pod| PodSummary {
                name: pod.metadata.name.unwrap_or_default(),
                phase: pod
                    .status
                    .and_then(|s| s.phase)
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect())
    }

    async fn delete_crd(&self, name: &str) -> Result<(), Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => ignore_not_found("delete crd", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    /// Client over a canned-response service that records every request
    fn recording_client(
        status: u16,
        body: serde_json::Value,
    ) -> (Client, Arc<Mutex<Vec<(String, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let service = tower::service_fn(move |req: http::Request<kube::client::Body>| {
            record
                .lock()
                .unwrap()
                .push((req.method().to_string(), req.uri().to_string()));
            let body = body.to_string();
            async move {
                Ok::<_, Infallible>(
                    http::Response::builder()
                        .status(status)
                        .header("content-type", "application/json")
                        .body(kube::client::Body::from(body.into_bytes()))
                        .unwrap(),
                )
            }
        });
        (Client::new(service, "default"), seen)
    }

    #[tokio::test]
    async fn test_ensure_namespace_twice_succeeds_without_duplicates() {
        let (client, seen) = recording_client(
            200,
            serde_json::json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": { "name": "backups" }
            }),
        );
        let cluster = KubeCluster::new(client);

        cluster.ensure_namespace("backups").await.unwrap();
        cluster.ensure_namespace("backups").await.unwrap();

        // both calls are the same server-side apply; nothing is created twice
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for (method, uri) in seen.iter() {
            assert_eq!(method, "PATCH");
            assert!(uri.starts_with("/api/v1/namespaces/backups?"));
            assert!(uri.contains(&format!("fieldManager={}", FIELD_MANAGER)));
        }
    }

    #[tokio::test]
    async fn test_delete_namespace_tolerates_absent_namespace() {
        let (client, _) = recording_client(
            404,
            serde_json::json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": "namespaces \"backups\" not found",
                "reason": "NotFound",
                "code": 404
            }),
        );
        let cluster = KubeCluster::new(client);

        cluster.delete_namespace("backups").await.unwrap();
    }
}
