use super::RolloutStrategy;
use crate::manifest::{Manifest, ManifestSet};
use crate::rollout::{Context, PhaseOutcome, RolloutError};
use async_trait::async_trait;
use tracing::info;

/// Basic strategy handler
///
/// Applies the input unchanged. There is nothing to promote or reject.
pub struct BasicStrategy;

impl BasicStrategy {
    fn unsupported(&self, phase: &str) -> RolloutError {
        RolloutError::Validation(format!(
            "{} strategy does not support the {} phase",
            self.name(),
            phase
        ))
    }
}

#[async_trait]
impl RolloutStrategy for BasicStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn deploy(&self, ctx: &Context, manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        info!(strategy = self.name(), objects = manifests.len(), "Applying manifests");
        let objects: Vec<Manifest> = manifests.iter().cloned().collect();
        let mut outcome = PhaseOutcome::default();
        outcome.record_apply(ctx.apply(objects).await?);
        Ok(outcome)
    }

    async fn promote(&self, _ctx: &Context, _manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        Err(self.unsupported("promote"))
    }

    async fn reject(&self, _ctx: &Context, _manifests: &ManifestSet) -> Result<PhaseOutcome, RolloutError> {
        Err(self.unsupported("reject"))
    }
}
