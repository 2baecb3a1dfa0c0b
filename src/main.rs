use clap::Parser;
use kroll::cli::{Cli, Commands};
use kroll::executor::Kubectl;
use kroll::{actions, Context};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let manifests = cli.rollout.manifests.clone();
    let config = cli.rollout.into_config();
    info!(
        phase = %cli.command.phase(),
        strategy = %config.strategy,
        manifests = manifests.len(),
        "Starting kroll"
    );

    let executor = Kubectl::new(config.namespace.clone());
    let ctx = Context::new(Arc::new(executor), config)?;

    let result = match cli.command {
        Commands::Deploy => actions::deploy(&ctx, &manifests).await,
        Commands::Promote => actions::promote(&ctx, &manifests).await,
        Commands::Reject => actions::reject(&ctx, &manifests).await,
    };

    match result {
        Ok(outcome) => {
            for file in outcome.manifest_files() {
                info!(path = %file.display(), "Applied manifest");
            }
            for target in &outcome.deleted {
                info!(kind = %target.kind, name = %target.name, "Deleted");
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Rollout failed");
            Err(e.into())
        }
    }
}
