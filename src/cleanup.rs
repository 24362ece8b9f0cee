//! Cleanup executor
//!
//! Ordered teardown of the backup subsystem: release uninstall, release
//! metadata secrets, target namespace, owned CRDs. The sequence is the same
//! in both modes; only the failure policy differs. Force mode swallows
//! every step failure (logged, never returned) so a reinstall can always
//! make forward progress from a half-broken deployment. Non-force mode
//! still attempts later steps, but the error returned is the earliest
//! failure, with the release uninstall weighted first.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::orchestrator::Orchestrator;

/// Record a cleanup step failure under the current failure policy
fn note_failure(first_error: &mut Option<Error>, force: bool, step: &str, err: Error) {
    warn!(step = %step, force = force, error = %err, "Cleanup step failed");
    if !force && first_error.is_none() {
        *first_error = Some(Error::cleanup_step(step, err));
    }
}

impl Orchestrator {
    /// Run the teardown sequence against a namespace.
    ///
    /// Cancellation aborts the remaining steps in either mode; it is the
    /// one error force mode does not swallow.
    pub(crate) async fn run_cleanup(
        &self,
        namespace: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("cleanup"));
        }

        let release = self.config.release_name.as_str();
        let candidates = self.config.namespace_candidates(namespace);
        let mut first_error: Option<Error> = None;

        info!(namespace = %namespace, force = force, "Starting cleanup");

        // 1. uninstall the release, first candidate namespace that works
        let mut uninstalled = false;
        let mut last_uninstall_error: Option<Error> = None;
        for candidate in &candidates {
            match self.package.uninstall(release, candidate, false).await {
                Ok(()) => {
                    info!(namespace = %candidate, release = %release, "Release uninstalled");
                    uninstalled = true;
                    break;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    debug!(namespace = %candidate, error = %e, "Uninstall attempt failed");
                    last_uninstall_error = Some(e);
                }
            }
        }
        if !uninstalled {
            let cause = last_uninstall_error
                .unwrap_or_else(|| Error::validation("no candidate namespaces to search"));
            note_failure(&mut first_error, force, "uninstall release", cause);
        }

        // 2. release metadata secrets across the candidate namespaces
        for candidate in &candidates {
            match self.package.list_release_secrets(release, candidate).await {
                Ok(names) => {
                    for name in names {
                        match self.cluster.delete_secret(candidate, &name).await {
                            Ok(()) => {
                                debug!(namespace = %candidate, secret = %name, "Deleted release secret")
                            }
                            Err(e) if e.is_cancelled() => return Err(e),
                            Err(e) => {
                                note_failure(&mut first_error, force, "delete release secrets", e)
                            }
                        }
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => note_failure(&mut first_error, force, "delete release secrets", e),
            }
        }

        // 3. target namespace; already absent is a no-op
        match self.cluster.delete_namespace(namespace).await {
            Ok(()) => debug!(namespace = %namespace, "Namespace deleted"),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => note_failure(&mut first_error, force, "delete namespace", e),
        }

        // 4. owned cluster-scoped CRDs
        for crd in &self.config.crds {
            match self.cluster.delete_crd(crd).await {
                Ok(()) => debug!(crd = %crd, "CRD deleted"),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => note_failure(&mut first_error, force, "delete crds", e),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(namespace = %namespace, "Cleanup finished");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cluster::MockClusterApi;
    use crate::config::OrchestratorConfig;
    use crate::helm::MockPackageApi;
    use crate::storage::MockObjectStorageApi;
    use crate::velero::MockBackupLocationApi;

    fn orchestrator(cluster: MockClusterApi, package: MockPackageApi) -> Orchestrator {
        Orchestrator::new(
            Arc::new(cluster),
            Arc::new(package),
            Arc::new(MockBackupLocationApi::new()),
            Arc::new(MockObjectStorageApi::new()),
            OrchestratorConfig::default(),
        )
    }

    fn crd_count() -> usize {
        OrchestratorConfig::default().crds.len()
    }

    #[tokio::test]
    async fn test_force_cleanup_runs_every_step_despite_failures() {
        let mut package = MockPackageApi::new();
        // three candidates: target, velero, kube-system
        package
            .expect_uninstall()
            .times(3)
            .returning(|_, _, _| Err(Error::helm("uninstall", "release not found")));
        package
            .expect_list_release_secrets()
            .times(3)
            .returning(|_, _| Err(Error::validation("forbidden")));
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_delete_namespace()
            .times(1)
            .returning(|_| Err(Error::validation("namespace stuck terminating")));
        cluster
            .expect_delete_crd()
            .times(crd_count())
            .returning(|_| Err(Error::validation("forbidden")));

        let orch = orchestrator(cluster, package);
        let result = orch
            .run_cleanup("backups", true, &CancellationToken::new())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_non_force_returns_uninstall_failure_first() {
        let mut package = MockPackageApi::new();
        package
            .expect_uninstall()
            .times(3)
            .returning(|_, _, _| Err(Error::helm("uninstall", "release not found")));
        package
            .expect_list_release_secrets()
            .returning(|_, _| Ok(vec![]));
        let mut cluster = MockClusterApi::new();
        // a later step also fails; the returned error must still be step 1's
        cluster
            .expect_delete_namespace()
            .returning(|_| Err(Error::validation("namespace stuck terminating")));
        cluster.expect_delete_crd().returning(|_| Ok(()));

        let orch = orchestrator(cluster, package);
        let err = orch
            .run_cleanup("backups", false, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::CleanupStep { step, .. } => assert_eq!(step, "uninstall release"),
            other => panic!("expected CleanupStep, got: {}", other),
        }
    }

    #[tokio::test]
    async fn test_uninstall_stops_at_first_successful_namespace() {
        let mut package = MockPackageApi::new();
        package
            .expect_uninstall()
            .times(1)
            .returning(|_, ns, _| {
                assert_eq!(ns, "backups");
                Ok(())
            });
        package
            .expect_list_release_secrets()
            .times(3)
            .returning(|_, ns| {
                if ns == "backups" {
                    Ok(vec!["sh.helm.release.v1.velero.v1".to_string()])
                } else {
                    Ok(vec![])
                }
            });
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_delete_secret()
            .times(1)
            .returning(|_, _| Ok(()));
        cluster.expect_delete_namespace().times(1).returning(|_| Ok(()));
        cluster
            .expect_delete_crd()
            .times(crd_count())
            .returning(|_| Ok(()));

        let orch = orchestrator(cluster, package);
        let result = orch
            .run_cleanup("backups", false, &CancellationToken::new())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let orch = orchestrator(MockClusterApi::new(), MockPackageApi::new());
        let err = orch.run_cleanup("backups", true, &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_mid_sequence_aborts_later_steps() {
        let mut package = MockPackageApi::new();
        package.expect_uninstall().times(1).returning(|_, _, _| Ok(()));
        package
            .expect_list_release_secrets()
            .times(1)
            .returning(|_, _| Err(Error::cancelled("list release secrets")));
        // delete_namespace and delete_crd must never run

        let orch = orchestrator(MockClusterApi::new(), package);
        let err = orch
            .run_cleanup("backups", true, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
