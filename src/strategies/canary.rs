//! Canary deployment strategy
//!
//! A canary (new version) and a baseline (clone of the live stable version)
//! run next to stable at the same size, so they can be compared like for
//! like. Without a router, traffic reaches them in proportion to their pod
//! count behind the existing Service. With SMI, a TrafficSplit sets the
//! shares explicitly and stable runs as `<name>-stable`.

use super::{workload_variant_targets, RolloutStrategy};
use crate::executor::DeleteTarget;
use crate::manifest::naming::{variant_name, Variant, CANARY_VERSION_LABEL};
use crate::manifest::{Manifest, ManifestSet, Workload};
use crate::rollout::weights::{canary_replica_count, CanaryWeights};
use crate::rollout::{Context, PhaseOutcome, RolloutError};
use crate::routing::TrafficRouter;
use async_trait::async_trait;
use tracing::{debug, info};

/// Canary strategy handler
///
/// `router` is `None` for pod-ratio traffic and an SMI router otherwise.
pub struct CanaryStrategy {
    router: Option<Box<dyn TrafficRouter>>,
}

impl CanaryStrategy {
    pub fn new(router: Option<Box<dyn TrafficRouter>>) -> Self {
        CanaryStrategy { router }
    }

    /// Name the live stable workload runs under
    fn stable_name(&self, name: &str) -> String {
        match self.router {
            Some(_) => variant_name(name, Variant::Stable),
            None => name.to_string(),
        }
    }

    /// Canary variants for every workload, plus a baseline wherever a stable
    /// one is already running
    async fn canary_workloads(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
    ) -> Result<Vec<Manifest>, RolloutError> {
        let percentage = ctx
            .config
            .canary_percentage()
            .map_err(RolloutError::Validation)?;
        let replica_override = ctx
            .config
            .replica_override()
            .map_err(RolloutError::Validation)?;

        let mut objects = Vec::new();
        for workload in manifests.workloads() {
            let name = workload.name()?;
            let replicas = replica_override
                .unwrap_or_else(|| canary_replica_count(workload.replicas(), percentage));

            objects.push(variant(workload.clone(), name, Variant::Canary, replicas).into());

            let stable_name = self.stable_name(name);
            match ctx.fetch(workload.kind.as_str(), &stable_name).await? {
                Some(Manifest::Workload(stable)) => {
                    debug!(workload = %name, stable = %stable_name, "Stable found, creating baseline");
                    objects.push(
                        variant(stable.sanitized(), name, Variant::Baseline, replicas).into(),
                    );
                }
                _ => {
                    debug!(workload = %name, "No stable workload yet, skipping baseline");
                }
            }

            info!(
                workload = %name,
                kind = workload.kind.as_str(),
                replicas = replicas,
                percentage = percentage,
                "Prepared canary"
            );
        }
        Ok(objects)
    }

    /// Baseline and canary workloads, plus their Services under SMI
    fn rollout_targets(&self, manifests: &ManifestSet) -> Result<Vec<DeleteTarget>, RolloutError> {
        let mut targets =
            workload_variant_targets(manifests, &[Variant::Baseline, Variant::Canary])?;
        if let Some(router) = &self.router {
            targets.extend(router.cleanup(manifests));
        }
        Ok(targets)
    }
}

/// `workload` renamed to the variant of `base`, labeled and resized
fn variant(workload: Workload, base: &str, variant: Variant, replicas: i32) -> Workload {
    workload
        .renamed(variant_name(base, variant))
        .with_label(CANARY_VERSION_LABEL, variant.label_value())
        .with_replicas(replicas)
}

#[async_trait]
impl RolloutStrategy for CanaryStrategy {
    fn name(&self) -> &'static str {
        match self.router {
            Some(_) => "canary-smi",
            None => "canary",
        }
    }

    async fn deploy(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        let mut outcome = PhaseOutcome::default();

        let mut objects = self.canary_workloads(ctx, manifests).await?;
        match &self.router {
            Some(router) => objects.extend(router.passthrough(manifests)),
            None => objects.extend(manifests.non_workloads().cloned()),
        }
        outcome.record_apply(ctx.apply(objects).await?);

        if let Some(router) = &self.router {
            let setup = router.setup(ctx, manifests).await?;
            outcome.record_apply(setup.result);
        }
        Ok(outcome)
    }

    async fn promote(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        let mut outcome = PhaseOutcome::default();

        match &self.router {
            None => {
                info!(strategy = self.name(), "Applying new version as stable");
                let objects: Vec<Manifest> = manifests.iter().cloned().collect();
                outcome.record_apply(ctx.apply(objects).await?);
            }
            Some(router) => {
                // Keep serving from canary while stable is replaced
                outcome.record_apply(
                    router
                        .redirect(ctx, manifests, CanaryWeights::all_canary().into())
                        .await?,
                );

                let mut objects = Vec::new();
                for workload in manifests.workloads() {
                    let name = workload.name()?;
                    let replicas = workload.replicas();
                    objects.push(variant(workload.clone(), name, Variant::Stable, replicas).into());
                }
                objects.extend(router.passthrough(manifests));
                info!(strategy = self.name(), objects = objects.len(), "Applying new stable version");
                outcome.record_apply(ctx.apply(objects).await?);

                outcome.record_apply(
                    router
                        .redirect(ctx, manifests, CanaryWeights::all_stable().into())
                        .await?,
                );
            }
        }

        let deleted = ctx.delete(self.rollout_targets(manifests)?).await?;
        outcome.record_delete(deleted);
        Ok(outcome)
    }

    async fn reject(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        let mut outcome = PhaseOutcome::default();

        if let Some(router) = &self.router {
            info!(strategy = self.name(), "Redirecting all traffic to stable");
            outcome.record_apply(
                router
                    .redirect(ctx, manifests, CanaryWeights::all_stable().into())
                    .await?,
            );
        }

        info!(strategy = self.name(), "Deleting baseline and canary");
        let deleted = ctx.delete(self.rollout_targets(manifests)?).await?;
        outcome.record_delete(deleted);
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "canary_test.rs"]
mod tests;
