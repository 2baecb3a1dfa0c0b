use super::{service_name, service_variant, RouterSetup, TrafficRouter};
use crate::executor::DeleteTarget;
use crate::manifest::naming::{base_name, variant_name, GreenLabel, Variant, BLUE_GREEN_VERSION_LABEL};
use crate::manifest::{EntityClass, Manifest, ManifestSet};
use crate::rollout::weights::Weights;
use crate::rollout::{Context, DeployResult, RolloutError};
use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::networking::v1::{Ingress, IngressServiceBackend};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Blue-green routing by rewriting Ingress backends
///
/// Services referenced by an input Ingress are owned by the router: green
/// traffic goes to a `<svc>-green` copy selecting the green pods, and the
/// original Service keeps serving stable.
pub struct IngressRouter;

fn service_backends(ingress: &Ingress) -> Vec<&IngressServiceBackend> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };
    let default = spec.default_backend.iter().filter_map(|b| b.service.as_ref());
    let rules = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .filter_map(|path| path.backend.service.as_ref());
    default.chain(rules).collect()
}

fn service_backends_mut(ingress: &mut Ingress) -> Vec<&mut IngressServiceBackend> {
    let Some(spec) = ingress.spec.as_mut() else {
        return Vec::new();
    };
    let default = spec.default_backend.iter_mut().filter_map(|b| b.service.as_mut());
    let rules = spec
        .rules
        .iter_mut()
        .flatten()
        .filter_map(|rule| rule.http.as_mut())
        .flat_map(|http| http.paths.iter_mut())
        .filter_map(|path| path.backend.service.as_mut());
    default.chain(rules).collect()
}

/// Backend name for a routed service under `label`
fn backend_for(service: &str, label: GreenLabel) -> String {
    match label {
        GreenLabel::Green => variant_name(service, Variant::Green),
        GreenLabel::None => service.to_string(),
    }
}

impl IngressRouter {
    /// Input Services referenced by at least one input Ingress
    fn routed_services(manifests: &ManifestSet) -> BTreeSet<String> {
        let referenced: BTreeSet<&str> = manifests
            .ingresses()
            .flat_map(service_backends)
            .map(|backend| base_name(&backend.name))
            .collect();
        manifests
            .services()
            .filter_map(|service| service.metadata.name.as_deref())
            .filter(|name| referenced.contains(name))
            .map(str::to_string)
            .collect()
    }

    fn routed_ingress(ingress: &Ingress, routed: &BTreeSet<String>, label: GreenLabel) -> Ingress {
        let mut ingress = ingress.clone();
        ingress
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(BLUE_GREEN_VERSION_LABEL.to_string(), label.value().to_string());
        for backend in service_backends_mut(&mut ingress) {
            let base = base_name(&backend.name).to_string();
            if routed.contains(&base) {
                backend.name = backend_for(&base, label);
            }
        }
        ingress
    }

    fn ingress_matches(live: &Ingress, routed: &BTreeSet<String>, label: GreenLabel) -> bool {
        let labeled = live
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(BLUE_GREEN_VERSION_LABEL))
            .map(String::as_str)
            == Some(label.value());
        labeled
            && service_backends(live).iter().all(|backend| {
                let base = base_name(&backend.name);
                !routed.contains(base) || backend.name == backend_for(base, label)
            })
    }
}

#[async_trait]
impl TrafficRouter for IngressRouter {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn passthrough(&self, manifests: &ManifestSet) -> Vec<Manifest> {
        let routed = Self::routed_services(manifests);
        manifests
            .non_workloads()
            .filter(|m| match m.class() {
                EntityClass::Ingress => false,
                EntityClass::Service => m.name().map_or(true, |name| !routed.contains(name)),
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// Routed Services under their own names, selecting stable pods
    fn promoted(&self, manifests: &ManifestSet) -> Result<Vec<Manifest>, RolloutError> {
        let routed = Self::routed_services(manifests);
        let mut objects = Vec::new();
        for service in manifests.services() {
            let name = service_name(service)?;
            if !routed.contains(name) {
                continue;
            }
            objects.push(
                service_variant(
                    service,
                    name.to_string(),
                    BLUE_GREEN_VERSION_LABEL,
                    GreenLabel::None.value(),
                    true,
                )
                .into(),
            );
        }
        Ok(objects)
    }

    async fn setup(&self, ctx: &Context, manifests: &ManifestSet) -> Result<RouterSetup, RolloutError> {
        let routed = Self::routed_services(manifests);
        let mut objects = Vec::new();
        for service in manifests.services() {
            let name = service_name(service)?;
            if !routed.contains(name) {
                continue;
            }
            let green = service_variant(
                service,
                variant_name(name, Variant::Green),
                BLUE_GREEN_VERSION_LABEL,
                GreenLabel::Green.value(),
                true,
            );
            objects.push(Manifest::from(green));
        }

        info!(router = self.name(), services = objects.len(), "Creating green services");
        let result = ctx.apply(objects.clone()).await?;
        Ok(RouterSetup { objects, result })
    }

    async fn redirect(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
        weights: Weights,
    ) -> Result<DeployResult, RolloutError> {
        let label = weights.label();
        let routed = Self::routed_services(manifests);
        let ingresses: Vec<Manifest> = manifests
            .ingresses()
            .map(|ingress| Self::routed_ingress(ingress, &routed, label).into())
            .collect();

        info!(
            router = self.name(),
            ingresses = ingresses.len(),
            label = label.value(),
            "Rewriting ingress backends"
        );
        ctx.apply(ingresses).await
    }

    async fn validate(&self, ctx: &Context, manifests: &ManifestSet, weights: Weights) -> bool {
        let label = weights.label();
        let routed = Self::routed_services(manifests);
        let names: Vec<String> = manifests
            .ingresses()
            .filter_map(|ingress| ingress.metadata.name.clone())
            .collect();

        let fetched = join_all(names.iter().map(|name| ctx.fetch("Ingress", name))).await;

        names.iter().zip(fetched).all(|(name, live)| match live {
            Ok(Some(Manifest::Ingress(ingress))) => {
                let matches = Self::ingress_matches(&ingress, &routed, label);
                if !matches {
                    warn!(ingress = %name, expected = label.value(), "Ingress is not routed as expected");
                }
                matches
            }
            Ok(_) => {
                warn!(ingress = %name, "Ingress not found");
                false
            }
            Err(e) => {
                warn!(ingress = %name, error = %e, "Failed to fetch ingress");
                false
            }
        })
    }

    fn cleanup(&self, manifests: &ManifestSet) -> Vec<DeleteTarget> {
        Self::routed_services(manifests)
            .iter()
            .map(|name| DeleteTarget::new("Service", variant_name(name, Variant::Green)))
            .collect()
    }
}
