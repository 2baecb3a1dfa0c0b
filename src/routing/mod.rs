//! Traffic routing backends
//!
//! This module defines the TrafficRouter trait and one implementation per
//! routing method:
//! - ServiceRouter: flips the version label in each Service selector
//! - IngressRouter: points Ingress backends at `-green` Service copies
//! - SmiRouter: writes SMI TrafficSplit weights (blue-green or canary)

pub mod ingress;
pub mod service;
pub mod smi;

use crate::config::{RolloutConfig, RouteMethod, Strategy, TrafficSplitMethod};
use crate::executor::DeleteTarget;
use crate::manifest::{Manifest, ManifestSet};
use crate::rollout::weights::Weights;
use crate::rollout::{Context, DeployResult, RolloutError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;

pub use ingress::IngressRouter;
pub use service::ServiceRouter;
pub use smi::{SmiRouter, SmiTopology};

/// Objects a router created during setup and the batch that applied them
#[derive(Debug, Clone, Default)]
pub struct RouterSetup {
    pub objects: Vec<Manifest>,
    pub result: DeployResult,
}

/// Routing backend used by a strategy
///
/// # Ordering
/// Strategies apply new variants before calling `redirect` toward them, and
/// call `redirect` toward stable before deleting anything `cleanup` returns.
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    /// Router name for logging
    fn name(&self) -> &'static str;

    /// Input objects the router does not own; applied unchanged with the new
    /// workloads
    fn passthrough(&self, manifests: &ManifestSet) -> Vec<Manifest>;

    /// Router-owned input objects to apply with the promoted stable
    /// workloads, before traffic is redirected back to them
    fn promoted(&self, _manifests: &ManifestSet) -> Result<Vec<Manifest>, RolloutError> {
        Ok(Vec::new())
    }

    /// Create the routing objects the rollout needs
    async fn setup(&self, ctx: &Context, manifests: &ManifestSet)
        -> Result<RouterSetup, RolloutError>;

    /// Move traffic to the given distribution
    async fn redirect(
        &self,
        ctx: &Context,
        manifests: &ManifestSet,
        weights: Weights,
    ) -> Result<DeployResult, RolloutError>;

    /// Whether the live routing objects match `weights` exactly
    ///
    /// Never fails: a fetch error or a missing object means `false`.
    async fn validate(&self, ctx: &Context, manifests: &ManifestSet, weights: Weights) -> bool;

    /// Routing objects to delete once traffic is off them
    fn cleanup(&self, manifests: &ManifestSet) -> Vec<DeleteTarget>;
}

/// Select the router for a configuration
///
/// # Selection Rules
/// 1. Blue-green uses the configured route method
/// 2. Canary uses SMI when the traffic split method is SMI
/// 3. Otherwise there is no router (traffic follows pod ratios)
pub fn select_router(config: &RolloutConfig) -> Option<Box<dyn TrafficRouter>> {
    match config.strategy {
        Strategy::BlueGreen => Some(blue_green_router(config.route_method)),
        Strategy::Canary => canary_router(config.traffic_split_method),
        Strategy::Basic => None,
    }
}

pub fn blue_green_router(route_method: RouteMethod) -> Box<dyn TrafficRouter> {
    match route_method {
        RouteMethod::Service => Box::new(ServiceRouter),
        RouteMethod::Ingress => Box::new(IngressRouter),
        RouteMethod::Smi => Box::new(SmiRouter::new(SmiTopology::BlueGreen)),
    }
}

pub fn canary_router(traffic_split_method: TrafficSplitMethod) -> Option<Box<dyn TrafficRouter>> {
    match traffic_split_method {
        TrafficSplitMethod::Smi => Some(Box::new(SmiRouter::new(SmiTopology::Canary))),
        TrafficSplitMethod::Pod => None,
    }
}

/// Copy of `service` under `name` carrying `key=value`
///
/// When `select` is set the label is also added to the selector, so the
/// copy only matches pods of that version.
pub(crate) fn service_variant(
    service: &Service,
    name: String,
    key: &str,
    value: &str,
    select: bool,
) -> Service {
    let mut variant = service.clone();
    variant.metadata.name = Some(name);
    variant.metadata.resource_version = None;
    variant.metadata.uid = None;
    variant
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());

    if select {
        if let Some(spec) = variant.spec.as_mut() {
            spec.selector
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
        }
    }
    variant
}

pub(crate) fn service_name(service: &Service) -> Result<&str, RolloutError> {
    Ok(crate::manifest::object_name(&service.metadata)?)
}
