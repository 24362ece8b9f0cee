//! Orchestrator configuration
//!
//! All waits, attempt counts, and namespace candidates are explicit config
//! rather than hardcoded globals, so tests can substitute their own values.
//! The stabilization delay after a forced cleanup is deliberately a named
//! duration and not a retry loop: it accounts for control-plane eventual
//! consistency, not for a retryable failure.

use std::time::Duration;

use crate::readiness::ReadinessConfig;
use crate::retry::RetryPolicy;

/// Velero-owned cluster-scoped CRDs removed during cleanup
pub const VELERO_CRDS: &[&str] = &[
    "backups.velero.io",
    "backupstoragelocations.velero.io",
    "backuprepositories.velero.io",
    "deletebackuprequests.velero.io",
    "downloadrequests.velero.io",
    "podvolumebackups.velero.io",
    "podvolumerestores.velero.io",
    "restores.velero.io",
    "schedules.velero.io",
    "serverstatusrequests.velero.io",
    "volumesnapshotlocations.velero.io",
];

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Helm release name for the backup subsystem
    pub release_name: String,
    /// Helm chart reference to install
    pub chart: String,
    /// Velero server image passed as an install-time value
    pub image: String,
    /// Name of the default backup storage location resource
    pub location_name: String,
    /// Retry policy for the retryable install steps
    pub retry: RetryPolicy,
    /// Poll interval and ceiling for pod readiness
    pub readiness: ReadinessConfig,
    /// Wait after a forced cleanup before reinstalling, letting the
    /// control plane settle
    pub stabilization_delay: Duration,
    /// Namespace candidates searched for the release and its metadata
    /// secrets, in addition to the target namespace
    pub fallback_namespaces: Vec<String>,
    /// Cluster-scoped CRDs deleted during cleanup
    pub crds: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            release_name: crate::RELEASE_NAME.to_string(),
            chart: "vmware-tanzu/velero".to_string(),
            image: "velero/velero:v1.14.0".to_string(),
            location_name: "default".to_string(),
            retry: RetryPolicy::default(),
            readiness: ReadinessConfig::default(),
            stabilization_delay: Duration::from_secs(15),
            fallback_namespaces: vec!["velero".to_string(), "kube-system".to_string()],
            crds: VELERO_CRDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl OrchestratorConfig {
    /// Namespace candidates for release uninstall and secret scanning:
    /// the target namespace first, then the configured fallbacks, deduplicated.
    pub fn namespace_candidates(&self, target: &str) -> Vec<String> {
        let mut candidates = vec![target.to_string()];
        for ns in &self.fallback_namespaces {
            if !candidates.iter().any(|c| c == ns) {
                candidates.push(ns.clone());
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.release_name, "velero");
        assert_eq!(config.location_name, "default");
        assert!(config.crds.contains(&"backups.velero.io".to_string()));
        assert!(config.stabilization_delay > Duration::ZERO);
    }

    #[test]
    fn test_namespace_candidates_target_first() {
        let config = OrchestratorConfig::default();
        let candidates = config.namespace_candidates("backups");
        assert_eq!(candidates, vec!["backups", "velero", "kube-system"]);
    }

    #[test]
    fn test_namespace_candidates_deduplicates_target() {
        let config = OrchestratorConfig::default();
        let candidates = config.namespace_candidates("velero");
        assert_eq!(candidates, vec!["velero", "kube-system"]);
    }
}
