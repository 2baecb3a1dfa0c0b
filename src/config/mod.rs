//! Rollout configuration
//!
//! One `RolloutConfig` describes a single invocation. The CLI fills it from
//! flags and `KROLL_*` environment variables; library callers build it
//! directly.

pub mod validation;

use crate::executor::ApplyOptions;
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::fmt;

/// Deployment strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Canary,
    BlueGreen,
    /// Apply manifests as they are
    Basic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Canary => "canary",
            Strategy::BlueGreen => "blue-green",
            Strategy::Basic => "basic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How blue-green shifts traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RouteMethod {
    #[default]
    Service,
    Ingress,
    Smi,
}

/// How canary shifts traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TrafficSplitMethod {
    /// Traffic follows the pod ratio behind the existing Service
    #[default]
    Pod,
    Smi,
}

/// Rollout step being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Deploy,
    Promote,
    Reject,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Deploy => "deploy",
            Phase::Promote => "promote",
            Phase::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RolloutConfig {
    pub strategy: Strategy,
    pub route_method: RouteMethod,
    pub traffic_split_method: TrafficSplitMethod,

    /// Share of traffic for baseline plus canary; required for canary deploy
    pub percentage: Option<i32>,

    /// Fixed replica count for baseline and canary, bypassing `percentage`
    pub baseline_and_canary_replicas: Option<i32>,

    pub force: bool,
    pub server_side: bool,
    pub timeout: Option<String>,

    /// Stamped on every applied object
    pub annotations: BTreeMap<String, String>,

    pub namespace: Option<String>,
}

impl RolloutConfig {
    pub fn new(strategy: Strategy) -> Self {
        RolloutConfig {
            strategy,
            route_method: RouteMethod::default(),
            traffic_split_method: TrafficSplitMethod::default(),
            percentage: None,
            baseline_and_canary_replicas: None,
            force: false,
            server_side: false,
            timeout: None,
            annotations: BTreeMap::new(),
            namespace: None,
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            force: self.force,
            server_side: self.server_side,
            timeout: self.timeout.clone(),
        }
    }

    /// Validated canary percentage
    pub fn canary_percentage(&self) -> Result<u32, String> {
        let percentage = self
            .percentage
            .ok_or_else(|| "percentage is required for canary deployments".to_string())?;
        crate::rollout::weights::validate_percentage(percentage)
    }

    /// Validated replica override, if one was given
    pub fn replica_override(&self) -> Result<Option<i32>, String> {
        self.baseline_and_canary_replicas
            .map(crate::rollout::weights::validate_replica_override)
            .transpose()
    }
}
