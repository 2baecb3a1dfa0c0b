//! SMI TrafficSplit routing
//!
//! Blue-green splits are named `<svc>-trafficsplit` and balance
//! `<svc>-stable` against `<svc>-green`. Canary splits are named
//! `<svc>-workflow-rollout` and balance stable, baseline and canary.

use super::{service_name, service_variant, RouterSetup, TrafficRouter};
use crate::executor::DeleteTarget;
use crate::manifest::naming::{
    blue_green_traffic_split_name, canary_traffic_split_name, variant_name, GreenLabel, Variant,
    BLUE_GREEN_VERSION_LABEL, CANARY_VERSION_LABEL,
};
use crate::manifest::{Manifest, ManifestSet, TrafficSplit, TRAFFIC_SPLIT_KIND};
use crate::rollout::weights::{BlueGreenWeights, CanaryWeights, Weights, MAX_WEIGHT};
use crate::rollout::{Context, DeployResult, RolloutError};
use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info, warn};

/// Which set of backends the split balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmiTopology {
    BlueGreen,
    Canary,
}

pub struct SmiRouter {
    topology: SmiTopology,
}

fn traffic_split_name(service: &str, weights: &Weights) -> String {
    match weights {
        Weights::Canary(_) => canary_traffic_split_name(service),
        Weights::BlueGreen(_) => blue_green_traffic_split_name(service),
    }
}

impl SmiRouter {
    pub fn new(topology: SmiTopology) -> Self {
        SmiRouter { topology }
    }

    /// TrafficSplit routing `service` per `weights`
    pub async fn traffic_split(
        &self,
        ctx: &Context,
        service: &str,
        weights: Weights,
    ) -> Result<TrafficSplit, RolloutError> {
        let api_version = ctx.traffic_split_api_version().await?;
        Ok(TrafficSplit::new(
            api_version,
            traffic_split_name(service, &weights),
            service,
            weights.backends(service),
        ))
    }

    async fn fetch_traffic_split(
        ctx: &Context,
        name: &str,
    ) -> Result<Option<TrafficSplit>, RolloutError> {
        match ctx.fetch(TRAFFIC_SPLIT_KIND, name).await? {
            Some(Manifest::TrafficSplit(split)) => Ok(Some(split)),
            Some(_) | None => Ok(None),
        }
    }

    async fn setup_blue_green(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
    ) -> Result<Vec<Manifest>, RolloutError> {
        let initial = Weights::from(BlueGreenWeights::for_label(GreenLabel::None));
        let mut objects = Vec::new();
        for service in manifests.services() {
            let name = service_name(service)?;
            objects.push(
                service_variant(
                    service,
                    variant_name(name, Variant::Stable),
                    BLUE_GREEN_VERSION_LABEL,
                    GreenLabel::None.value(),
                    false,
                )
                .into(),
            );
            objects.push(
                service_variant(
                    service,
                    variant_name(name, Variant::Green),
                    BLUE_GREEN_VERSION_LABEL,
                    GreenLabel::Green.value(),
                    true,
                )
                .into(),
            );
            objects.push(self.traffic_split(ctx, name, initial).await?.into());
        }
        Ok(objects)
    }

    /// On the first rollout `<svc>-stable` selects no pods yet (stable
    /// workloads still run under their base names), so the new split sends
    /// everything to canary.
    async fn setup_canary(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
    ) -> Result<Vec<Manifest>, RolloutError> {
        let mut objects = Vec::new();
        for service in manifests.services() {
            let name = service_name(service)?;
            objects.push(canary_service(service, name, Variant::Canary).into());
            objects.push(canary_service(service, name, Variant::Baseline).into());

            let stable_name = variant_name(name, Variant::Stable);
            if ctx.fetch("Service", &stable_name).await?.is_none() {
                debug!(service = %name, "No stable service yet, creating it with a new traffic split");
                objects.push(canary_service(service, name, Variant::Stable).into());
                let split = self
                    .traffic_split(ctx, name, CanaryWeights::all_canary().into())
                    .await?;
                objects.push(split.into());
                continue;
            }

            let live = Self::fetch_traffic_split(ctx, &canary_traffic_split_name(name)).await?;
            let canary_service_name = variant_name(name, Variant::Canary);
            if live.and_then(|split| split.weight_of(&canary_service_name)) == Some(MAX_WEIGHT) {
                debug!(service = %name, "Traffic split already routes everything to canary");
                continue;
            }

            let percentage = ctx
                .config
                .canary_percentage()
                .map_err(RolloutError::Validation)?;
            let split = self
                .traffic_split(ctx, name, CanaryWeights::for_percentage(percentage).into())
                .await?;
            objects.push(split.into());
        }
        Ok(objects)
    }
}

/// `<svc>-<variant>` selecting only pods of that canary variant
fn canary_service(service: &Service, name: &str, variant: Variant) -> Service {
    service_variant(
        service,
        variant_name(name, variant),
        CANARY_VERSION_LABEL,
        variant.label_value(),
        true,
    )
}

#[async_trait]
impl TrafficRouter for SmiRouter {
    fn name(&self) -> &'static str {
        match self.topology {
            SmiTopology::BlueGreen => "smi-blue-green",
            SmiTopology::Canary => "smi-canary",
        }
    }

    fn passthrough(&self, manifests: &ManifestSet) -> Vec<Manifest> {
        manifests.non_workloads().cloned().collect()
    }

    async fn setup(&self, ctx: &Context, manifests: &ManifestSet) -> Result<RouterSetup, RolloutError> {
        let objects = match self.topology {
            SmiTopology::BlueGreen => self.setup_blue_green(ctx, manifests).await?,
            SmiTopology::Canary => self.setup_canary(ctx, manifests).await?,
        };
        info!(router = self.name(), objects = objects.len(), "Setting up SMI objects");
        let result = ctx.apply(objects.clone()).await?;
        Ok(RouterSetup { objects, result })
    }

    async fn redirect(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
        weights: Weights,
    ) -> Result<DeployResult, RolloutError> {
        let mut desired = Vec::new();
        for service in manifests.services() {
            desired.push(self.traffic_split(ctx, service_name(service)?, weights).await?);
        }

        let live = join_all(
            desired
                .iter()
                .map(|split| Self::fetch_traffic_split(ctx, split.metadata.name.as_deref().unwrap_or_default())),
        )
        .await;

        let mut pending = Vec::new();
        for (split, live) in desired.into_iter().zip(live) {
            match live {
                Ok(Some(current)) if current.has_weights(&split.spec.backends) => {
                    debug!(traffic_split = ?split.metadata.name, "Traffic split already matches");
                }
                Ok(_) => pending.push(Manifest::from(split)),
                Err(e) => {
                    warn!(traffic_split = ?split.metadata.name, error = %e, "Failed to read traffic split, applying it");
                    pending.push(Manifest::from(split));
                }
            }
        }

        info!(
            router = self.name(),
            traffic_splits = pending.len(),
            weights = ?weights,
            "Redirecting traffic"
        );
        ctx.apply(pending).await
    }

    async fn validate(&self, ctx: &Context, manifests: &ManifestSet, weights: Weights) -> bool {
        let services: Vec<String> = manifests
            .services()
            .filter_map(|service| service.metadata.name.clone())
            .collect();
        let names: Vec<String> = services
            .iter()
            .map(|service| traffic_split_name(service, &weights))
            .collect();

        let fetched = join_all(names.iter().map(|name| Self::fetch_traffic_split(ctx, name))).await;

        services.iter().zip(names.iter()).zip(fetched).all(|((service, name), live)| {
            let expected = weights.backends(service);
            match live {
                Ok(Some(split)) if split.has_weights(&expected) => true,
                Ok(Some(split)) => {
                    warn!(
                        traffic_split = %name,
                        expected = ?expected,
                        actual = ?split.spec.backends,
                        "Traffic split weights differ"
                    );
                    false
                }
                Ok(None) => {
                    warn!(traffic_split = %name, "Traffic split not found");
                    false
                }
                Err(e) => {
                    warn!(traffic_split = %name, error = %e, "Failed to fetch traffic split");
                    false
                }
            }
        })
    }

    fn cleanup(&self, manifests: &ManifestSet) -> Vec<DeleteTarget> {
        let variants: &[Variant] = match self.topology {
            SmiTopology::BlueGreen => &[Variant::Green],
            SmiTopology::Canary => &[Variant::Baseline, Variant::Canary],
        };
        manifests
            .services()
            .filter_map(|service| service.metadata.name.as_deref())
            .flat_map(|name| {
                variants
                    .iter()
                    .map(move |variant| DeleteTarget::new("Service", variant_name(name, *variant)))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "smi_test.rs"]
mod tests;
