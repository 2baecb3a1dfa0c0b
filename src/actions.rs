//! Phase entry points
//!
//! Each phase validates the configuration, loads the manifests and hands them
//! to the configured strategy. Validation and parsing both finish before the
//! first cluster call.

use crate::config::validation::validate_config;
use crate::config::Phase;
use crate::manifest::ManifestSet;
use crate::rollout::{Context, PhaseOutcome, RolloutError};
use crate::strategies::select_strategy;
use std::path::PathBuf;
use tracing::{error, info};

/// Create the new version next to the current one
pub async fn deploy(ctx: &Context, paths: &[PathBuf]) -> Result<PhaseOutcome, RolloutError> {
    run(ctx, Phase::Deploy, paths).await
}

/// Make the deployed version stable
pub async fn promote(ctx: &Context, paths: &[PathBuf]) -> Result<PhaseOutcome, RolloutError> {
    run(ctx, Phase::Promote, paths).await
}

/// Abandon the deployed version
pub async fn reject(ctx: &Context, paths: &[PathBuf]) -> Result<PhaseOutcome, RolloutError> {
    run(ctx, Phase::Reject, paths).await
}

async fn run(ctx: &Context, phase: Phase, paths: &[PathBuf]) -> Result<PhaseOutcome, RolloutError> {
    validate_config(&ctx.config, phase).map_err(RolloutError::Validation)?;

    let manifests = ManifestSet::load(paths)?;
    let strategy = select_strategy(&ctx.config);
    info!(
        phase = %phase,
        strategy = strategy.name(),
        manifests = manifests.len(),
        "Starting rollout phase"
    );

    let result = match phase {
        Phase::Deploy => strategy.deploy(ctx, &manifests).await,
        Phase::Promote => strategy.promote(ctx, &manifests).await,
        Phase::Reject => strategy.reject(ctx, &manifests).await,
    };

    match &result {
        Ok(outcome) => info!(
            phase = %phase,
            strategy = strategy.name(),
            applied = outcome.manifest_files().count(),
            deleted = outcome.deleted.len(),
            "Rollout phase complete"
        ),
        Err(e) => error!(phase = %phase, strategy = strategy.name(), error = %e, "Rollout phase failed"),
    }
    result
}
