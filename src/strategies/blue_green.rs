//! Blue-green deployment strategy
//!
//! The new version runs as a full `<name>-green` copy. A router moves all
//! traffic to it on deploy; promote re-validates that routing before the new
//! version replaces stable under the original names.

use super::{workload_variant_targets, RolloutStrategy};
use crate::manifest::naming::{variant_name, GreenLabel, Variant, BLUE_GREEN_VERSION_LABEL};
use crate::manifest::{Manifest, ManifestSet};
use crate::rollout::weights::{BlueGreenWeights, Weights};
use crate::rollout::{Context, PhaseOutcome, RolloutError};
use crate::routing::TrafficRouter;
use async_trait::async_trait;
use tracing::{error, info};

/// Blue-green strategy handler
pub struct BlueGreenStrategy {
    router: Box<dyn TrafficRouter>,
}

fn weights(label: GreenLabel) -> Weights {
    BlueGreenWeights::for_label(label).into()
}

impl BlueGreenStrategy {
    pub fn new(router: Box<dyn TrafficRouter>) -> Self {
        BlueGreenStrategy { router }
    }

    /// Every input workload under `name`, carrying `label`
    fn labeled_workloads(
        manifests: &ManifestSet,
        label: GreenLabel,
        name: impl Fn(&str) -> String,
    ) -> Result<Vec<Manifest>, RolloutError> {
        manifests
            .workloads()
            .map(|workload| -> Result<Manifest, RolloutError> {
                let renamed = name(workload.name()?);
                Ok(workload
                    .clone()
                    .renamed(renamed)
                    .with_label(BLUE_GREEN_VERSION_LABEL, label.value())
                    .into())
            })
            .collect()
    }
}

#[async_trait]
impl RolloutStrategy for BlueGreenStrategy {
    fn name(&self) -> &'static str {
        "blue-green"
    }

    async fn deploy(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        let mut outcome = PhaseOutcome::default();

        let mut objects = Self::labeled_workloads(manifests, GreenLabel::Green, |name| {
            variant_name(name, Variant::Green)
        })?;
        objects.extend(self.router.passthrough(manifests));
        info!(
            strategy = self.name(),
            router = self.router.name(),
            objects = objects.len(),
            "Deploying green version"
        );
        outcome.record_apply(ctx.apply(objects).await?);

        let setup = self.router.setup(ctx, manifests).await?;
        outcome.record_apply(setup.result);

        outcome.record_apply(
            self.router
                .redirect(ctx, manifests, weights(GreenLabel::Green))
                .await?,
        );
        Ok(outcome)
    }

    async fn promote(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        if !self
            .router
            .validate(ctx, manifests, weights(GreenLabel::Green))
            .await
        {
            error!(
                strategy = self.name(),
                router = self.router.name(),
                "Green version is not receiving all traffic, refusing to promote"
            );
            return Err(RolloutError::TrafficNotValidated(format!(
                "{} routing does not send all traffic to the green version",
                self.router.name()
            )));
        }

        let mut outcome = PhaseOutcome::default();

        let mut stable = Self::labeled_workloads(manifests, GreenLabel::None, str::to_string)?;
        stable.extend(self.router.promoted(manifests)?);
        info!(strategy = self.name(), objects = stable.len(), "Promoting green version to stable");
        outcome.record_apply(ctx.apply(stable).await?);

        outcome.record_apply(
            self.router
                .redirect(ctx, manifests, weights(GreenLabel::None))
                .await?,
        );

        let mut targets = workload_variant_targets(manifests, &[Variant::Green])?;
        targets.extend(self.router.cleanup(manifests));
        outcome.record_delete(ctx.delete(targets).await?);
        Ok(outcome)
    }

    async fn reject(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        let mut outcome = PhaseOutcome::default();

        info!(strategy = self.name(), router = self.router.name(), "Routing traffic back to stable");
        outcome.record_apply(
            self.router
                .redirect(ctx, manifests, weights(GreenLabel::None))
                .await?,
        );

        let green = workload_variant_targets(manifests, &[Variant::Green])?;
        outcome.record_delete(ctx.delete(green).await?);

        outcome.record_delete(ctx.delete(self.router.cleanup(manifests)).await?);
        Ok(outcome)
    }
}
