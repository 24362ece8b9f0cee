//! Install strategy resolution
//!
//! A pure decision over a health snapshot and the caller's force flag.
//! Force always wins; otherwise a healthy deployment is left alone and
//! anything less gets a fresh install.

use serde::Serialize;

use crate::status::HealthSnapshot;

/// How an install request should proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Tear down whatever exists, then install fresh
    ForceReinstall,
    /// Nothing usable exists; install fresh without cleanup
    FreshInstall,
    /// Deployment is healthy; make no changes
    SkipInstall,
}

impl Strategy {
    /// Resolve the strategy for a snapshot and force flag.
    ///
    /// Force short-circuits: the snapshot is not consulted at all, so a
    /// half-broken deployment cannot talk the caller out of a reinstall.
    pub fn resolve(snapshot: HealthSnapshot, force: bool) -> Self {
        if force {
            Strategy::ForceReinstall
        } else if snapshot.is_healthy {
            Strategy::SkipInstall
        } else {
            Strategy::FreshInstall
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strategy::ForceReinstall => "force_reinstall",
            Strategy::FreshInstall => "fresh_install",
            Strategy::SkipInstall => "skip_install",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_wins_regardless_of_health() {
        for pods in [false, true] {
            for released in [false, true] {
                let snapshot = HealthSnapshot::new(pods, released);
                assert_eq!(
                    Strategy::resolve(snapshot, true),
                    Strategy::ForceReinstall,
                    "pods={} released={}",
                    pods,
                    released
                );
            }
        }
    }

    #[test]
    fn test_healthy_without_force_skips() {
        let snapshot = HealthSnapshot::new(true, true);
        assert_eq!(Strategy::resolve(snapshot, false), Strategy::SkipInstall);
    }

    #[test]
    fn test_anything_less_than_healthy_installs_fresh() {
        for (pods, released) in [(false, false), (true, false), (false, true)] {
            let snapshot = HealthSnapshot::new(pods, released);
            assert_eq!(
                Strategy::resolve(snapshot, false),
                Strategy::FreshInstall,
                "pods={} released={}",
                pods,
                released
            );
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Strategy::ForceReinstall.to_string(), "force_reinstall");
        assert_eq!(Strategy::FreshInstall.to_string(), "fresh_install");
        assert_eq!(Strategy::SkipInstall.to_string(), "skip_install");
    }
}
