//! Package deployment API
//!
//! The backup subsystem is deployed as a Helm release. This module defines
//! the narrow interface the executors need (install, upgrade, uninstall,
//! release search, release-metadata secrets) and implements it by shelling
//! out to the `helm` binary, the same adapter pattern used for other
//! external cluster tooling. Release metadata secrets are read through the
//! Kubernetes API directly since Helm stores them as labelled secrets.

use std::process::Stdio;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::Error;

/// Label selector matching Helm's release-metadata secrets for a release
fn release_secret_selector(release: &str) -> String {
    format!("owner=helm,name={}", release)
}

/// Package deployment operations used by the executors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageApi: Send + Sync {
    /// Install a release from a chart with the given values
    async fn install(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Upgrade an existing release with the given values
    async fn upgrade(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Uninstall a release from a namespace
    async fn uninstall(&self, release: &str, namespace: &str, dry_run: bool) -> Result<(), Error>;

    /// Whether the release exists in any namespace
    async fn is_installed(&self, release: &str) -> Result<bool, Error>;

    /// Names of the release-metadata secrets in a namespace
    async fn list_release_secrets(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Vec<String>, Error>;
}

/// One entry of `helm list -o json`; only the name is consulted
#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
}

/// Parse `helm list -o json` output and check for a release by exact name
fn release_present(list_json: &str, release: &str) -> Result<bool, Error> {
    let entries: Vec<HelmListEntry> = serde_json::from_str(list_json)
        .map_err(|e| Error::helm("list", format!("unparseable release list: {}", e)))?;
    Ok(entries.iter().any(|entry| entry.name == release))
}

/// [`PackageApi`] backed by the `helm` binary
#[derive(Clone)]
pub struct HelmCli {
    client: Client,
}

impl HelmCli {
    /// Create a Helm adapter; the kube client is used for release-metadata
    /// secret scanning
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Run helm with the given args, piping `stdin` if provided, and return
    /// stdout on success
    async fn run_helm(
        &self,
        operation: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<String, Error> {
        debug!(operation = %operation, args = ?args, "Running helm");

        let mut command = Command::new("helm");
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::helm(operation, format!("failed to spawn helm: {}", e)))?;

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                handle
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| Error::helm(operation, format!("failed to write values: {}", e)))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::helm(operation, format!("helm did not exit cleanly: {}", e)))?;

        if !output.status.success() {
            return Err(Error::helm(
                operation,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl PackageApi for HelmCli {
    async fn install(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), Error> {
        let values_json = values.to_string();
        self.run_helm(
            "install",
            &[
                "install", release, chart, "--namespace", namespace, "--values", "-",
            ],
            Some(&values_json),
        )
        .await?;
        Ok(())
    }

    async fn upgrade(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), Error> {
        let values_json = values.to_string();
        self.run_helm(
            "upgrade",
            &[
                "upgrade", release, chart, "--namespace", namespace, "--values", "-",
            ],
            Some(&values_json),
        )
        .await?;
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str, dry_run: bool) -> Result<(), Error> {
        let mut args = vec!["uninstall", release, "--namespace", namespace];
        if dry_run {
            args.push("--dry-run");
        }
        self.run_helm("uninstall", &args, None).await?;
        Ok(())
    }

    async fn is_installed(&self, release: &str) -> Result<bool, Error> {
        let filter = format!("^{}$", release);
        let stdout = self
            .run_helm(
                "list",
                &[
                    "list",
                    "--all-namespaces",
                    "--filter",
                    &filter,
                    "-o",
                    "json",
                ],
                None,
            )
            .await?;
        release_present(&stdout, release)
    }

    async fn list_release_secrets(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Vec<String>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let selector = release_secret_selector(release);
        let secrets = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::kube("list release secrets", e))?;

        Ok(secrets
            .items
            .into_iter()
            .filter_map(|secret| secret.metadata.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_present_matches_exact_name() {
        let json = r#"[
            {"name": "velero", "namespace": "velero", "status": "deployed"},
            {"name": "velero-old", "namespace": "backup", "status": "failed"}
        ]"#;

        assert!(release_present(json, "velero").unwrap());
        assert!(release_present(json, "velero-old").unwrap());
        assert!(!release_present(json, "velero-new").unwrap());
    }

    #[test]
    fn test_release_present_empty_list() {
        assert!(!release_present("[]", "velero").unwrap());
    }

    #[test]
    fn test_release_present_rejects_garbage() {
        let err = release_present("Error: unknown flag", "velero").unwrap_err();
        assert!(err.to_string().contains("unparseable"));
    }

    #[test]
    fn test_release_secret_selector() {
        assert_eq!(release_secret_selector("velero"), "owner=helm,name=velero");
    }

    #[test]
    fn test_release_present_ignores_extra_fields() {
        let json = r#"[{"name": "velero", "namespace": "backups", "revision": "3"}]"#;
        assert!(release_present(json, "velero").unwrap());
    }
}
