//! Velero orchestrator CLI - install, inspect, and tear down the backup subsystem

use clap::{Parser, Subcommand};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use velero_orchestrator::config::OrchestratorConfig;
use velero_orchestrator::storage::StorageSpec;
use velero_orchestrator::{InstallRequest, Orchestrator, UninstallRequest};

/// Managed installation orchestrator for the Velero backup subsystem
#[derive(Parser, Debug)]
#[command(name = "velero-orchestrator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the backup subsystem into a namespace
    ///
    /// Resolves a strategy from the live cluster first: a healthy
    /// deployment is left alone unless --force is given.
    Install(InstallArgs),

    /// Uninstall the backup subsystem from a namespace
    Uninstall {
        /// Namespace the subsystem was installed into
        #[arg(long)]
        namespace: String,

        /// Continue past step failures instead of aborting
        #[arg(long)]
        force: bool,
    },

    /// Remove every trace of the subsystem
    Cleanup {
        /// Namespace the subsystem was installed into
        #[arg(long)]
        namespace: String,

        /// Continue past step failures instead of aborting (pass
        /// --force=false to abort on the first failure)
        #[arg(
            long,
            default_value_t = true,
            default_missing_value = "true",
            num_args = 0..=1,
            action = clap::ArgAction::Set
        )]
        force: bool,
    },

    /// Print the strategy an install request would resolve to
    Strategy(InstallArgs),
}

/// Install-shaped arguments, shared by install and strategy
#[derive(Parser, Debug)]
struct InstallArgs {
    /// Target namespace
    #[arg(long)]
    namespace: String,

    /// Tear down whatever exists before installing
    #[arg(long)]
    force: bool,

    /// Object storage endpoint URL
    #[arg(long, env = "STORAGE_ENDPOINT")]
    endpoint: String,

    /// Bucket backups are written to
    #[arg(long, env = "STORAGE_BUCKET")]
    bucket: String,

    /// Region hint for the object store
    #[arg(long, env = "STORAGE_REGION")]
    region: Option<String>,

    /// Access key id
    #[arg(long, env = "STORAGE_ACCESS_KEY")]
    access_key: String,

    /// Secret access key
    #[arg(long, env = "STORAGE_SECRET_KEY")]
    secret_key: String,

    /// Skip TLS certificate verification for the object store
    #[arg(long)]
    skip_tls_verify: bool,
}

impl InstallArgs {
    fn into_request(self) -> InstallRequest {
        InstallRequest {
            namespace: self.namespace,
            force: self.force,
            storage: StorageSpec {
                endpoint: self.endpoint,
                bucket: self.bucket,
                region: self.region,
                access_key: self.access_key,
                secret_key: self.secret_key,
                skip_tls_verify: self.skip_tls_verify,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let client = Client::try_default().await?;
    let orchestrator = Orchestrator::from_client(client, OrchestratorConfig::default());

    // ctrl-c aborts the current step and skips the rest of the sequence
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting");
            signal_token.cancel();
        }
    });

    match cli.command {
        Commands::Install(args) => {
            let request = args.into_request();
            let result = orchestrator.install(&request, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Uninstall { namespace, force } => {
            let request = UninstallRequest { namespace, force };
            orchestrator.uninstall(&request, &cancel).await?;
            println!("uninstalled");
        }
        Commands::Cleanup { namespace, force } => {
            orchestrator.cleanup(&namespace, force, &cancel).await?;
            println!("cleaned up");
        }
        Commands::Strategy(args) => {
            let request = args.into_request();
            let (strategy, snapshot) = orchestrator.determine_strategy(&request).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "strategy": strategy,
                    "snapshot": snapshot,
                }))?
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_defaults_to_force() {
        let cli = Cli::parse_from(["velero-orchestrator", "cleanup", "--namespace", "backups"]);
        match cli.command {
            Commands::Cleanup { namespace, force } => {
                assert_eq!(namespace, "backups");
                assert!(force);
            }
            other => panic!("expected cleanup command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_force_flag_alone_stays_force() {
        let cli = Cli::parse_from([
            "velero-orchestrator",
            "cleanup",
            "--namespace",
            "backups",
            "--force",
        ]);
        match cli.command {
            Commands::Cleanup { force, .. } => assert!(force),
            other => panic!("expected cleanup command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_force_can_be_disabled() {
        let cli = Cli::parse_from([
            "velero-orchestrator",
            "cleanup",
            "--namespace",
            "backups",
            "--force=false",
        ]);
        match cli.command {
            Commands::Cleanup { force, .. } => assert!(!force),
            other => panic!("expected cleanup command, got: {:?}", other),
        }
    }
}
