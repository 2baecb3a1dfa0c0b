use super::{service_name, service_variant, RouterSetup, TrafficRouter};
use crate::executor::DeleteTarget;
use crate::manifest::naming::{GreenLabel, BLUE_GREEN_VERSION_LABEL};
use crate::manifest::{EntityClass, Manifest, ManifestSet};
use crate::rollout::weights::Weights;
use crate::rollout::{Context, DeployResult, RolloutError};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

/// Blue-green routing by swapping the version label in Service selectors
///
/// Each Service is re-applied in place, so the switch is atomic per Service.
pub struct ServiceRouter;

impl ServiceRouter {
    fn relabeled(manifests: &ManifestSet, label: GreenLabel) -> Result<Vec<Manifest>, RolloutError> {
        manifests
            .services()
            .map(|service| -> Result<Manifest, RolloutError> {
                let name = service_name(service)?.to_string();
                Ok(service_variant(service, name, BLUE_GREEN_VERSION_LABEL, label.value(), true).into())
            })
            .collect()
    }
}

#[async_trait]
impl TrafficRouter for ServiceRouter {
    fn name(&self) -> &'static str {
        "service"
    }

    fn passthrough(&self, manifests: &ManifestSet) -> Vec<Manifest> {
        manifests
            .non_workloads()
            .filter(|m| m.class() != EntityClass::Service)
            .cloned()
            .collect()
    }

    async fn setup(&self, _ctx: &Context, _manifests: &ManifestSet) -> Result<RouterSetup, RolloutError> {
        Ok(RouterSetup::default())
    }

    async fn redirect(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
        weights: Weights,
    ) -> Result<DeployResult, RolloutError> {
        let label = weights.label();
        let services = Self::relabeled(manifests, label)?;
        info!(
            router = self.name(),
            services = services.len(),
            label = label.value(),
            "Switching service selectors"
        );
        ctx.apply(services).await
    }

    async fn validate(&self, ctx: &Context, manifests: &ManifestSet, weights: Weights) -> bool {
        let expected = weights.label().value();
        let names: Vec<String> = manifests
            .services()
            .filter_map(|service| service.metadata.name.clone())
            .collect();

        let fetched = join_all(names.iter().map(|name| ctx.fetch("Service", name))).await;

        names.iter().zip(fetched).all(|(name, live)| {
            let actual = match live {
                Ok(Some(Manifest::Service(service))) => service
                    .spec
                    .and_then(|spec| spec.selector)
                    .and_then(|selector| selector.get(BLUE_GREEN_VERSION_LABEL).cloned()),
                Ok(_) => None,
                Err(e) => {
                    warn!(service = %name, error = %e, "Failed to fetch service");
                    None
                }
            };
            let matches = actual.as_deref() == Some(expected);
            if !matches {
                warn!(service = %name, expected = expected, actual = ?actual, "Service selector mismatch");
            }
            matches
        })
    }

    fn cleanup(&self, _manifests: &ManifestSet) -> Vec<DeleteTarget> {
        Vec::new()
    }
}
