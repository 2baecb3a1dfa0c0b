//! Strategy pattern for rollout phases
//!
//! This module defines the RolloutStrategy trait and one implementation per
//! deployment strategy:
//! - CanaryStrategy: baseline and canary next to stable, traffic by pod ratio
//!   or SMI weights
//! - BlueGreenStrategy: a full green copy, switched over by a router
//! - BasicStrategy: plain apply

pub mod basic;
pub mod blue_green;
pub mod canary;

use crate::config::{RolloutConfig, Strategy};
use crate::executor::DeleteTarget;
use crate::manifest::naming::{variant_name, Variant};
use crate::manifest::ManifestSet;
use crate::rollout::{Context, PhaseOutcome, RolloutError};
use crate::routing::{blue_green_router, canary_router};
use async_trait::async_trait;

/// One deployment strategy
///
/// Each phase is a one-shot sequence of applies, redirects and deletes. A
/// failed step aborts the phase; nothing is rolled back automatically, and
/// every phase is safe to run again after a partial failure.
#[async_trait]
pub trait RolloutStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Roll the new version out next to the current one
    async fn deploy(&self, ctx: &Context, manifests: &ManifestSet)
        -> Result<PhaseOutcome, RolloutError>;

    /// Make the new version the stable one and remove the rollout variants
    async fn promote(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
    ) -> Result<PhaseOutcome, RolloutError>;

    /// Send traffic back to stable and remove the rollout variants
    async fn reject(&self, ctx: &Context, manifests: &ManifestSet)
        -> Result<PhaseOutcome, RolloutError>;
}

/// Select the strategy handler for a configuration
///
/// # Example
/// ```ignore
/// let strategy = select_strategy(&ctx.config);
/// info!(strategy = strategy.name(), "Selected strategy");
/// ```
pub fn select_strategy(config: &RolloutConfig) -> Box<dyn RolloutStrategy> {
    use crate::strategies::{
        basic::BasicStrategy, blue_green::BlueGreenStrategy, canary::CanaryStrategy,
    };

    match config.strategy {
        Strategy::Canary => Box::new(CanaryStrategy::new(canary_router(
            config.traffic_split_method,
        ))),
        Strategy::BlueGreen => Box::new(BlueGreenStrategy::new(blue_green_router(
            config.route_method,
        ))),
        Strategy::Basic => Box::new(BasicStrategy),
    }
}

/// Delete targets for the given variants of every input workload
pub(crate) fn workload_variant_targets(
    manifests: &ManifestSet,
    variants: &[Variant],
) -> Result<Vec<DeleteTarget>, RolloutError> {
    let mut targets = Vec::new();
    for workload in manifests.workloads() {
        let name = workload.name()?;
        for variant in variants {
            targets.push(DeleteTarget::new(
                workload.kind.as_str(),
                variant_name(name, *variant),
            ));
        }
    }
    Ok(targets)
}
