//! Command-line interface
//!
//! Every flag can also come from a `KROLL_*` environment variable, so a CI
//! job can set the strategy once and call the three phases by subcommand.

use crate::config::{Phase, RolloutConfig, RouteMethod, Strategy, TrafficSplitMethod};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kroll")]
#[command(about = "Canary and blue-green rollout steps for Kubernetes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub rollout: RolloutArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Deploy the new version next to the current one
    Deploy,

    /// Make the deployed version stable and remove rollout objects
    Promote,

    /// Route traffic back to stable and remove rollout objects
    Reject,
}

impl Commands {
    pub fn phase(&self) -> Phase {
        match self {
            Commands::Deploy => Phase::Deploy,
            Commands::Promote => Phase::Promote,
            Commands::Reject => Phase::Reject,
        }
    }
}

#[derive(Args, Debug)]
pub struct RolloutArgs {
    /// Deployment strategy
    #[arg(long, global = true, value_enum, env = "KROLL_STRATEGY", default_value = "basic")]
    pub strategy: Strategy,

    /// Blue-green routing method
    #[arg(long, global = true, value_enum, env = "KROLL_ROUTE_METHOD", default_value = "service")]
    pub route_method: RouteMethod,

    /// Canary traffic split method
    #[arg(
        long,
        global = true,
        value_enum,
        env = "KROLL_TRAFFIC_SPLIT_METHOD",
        default_value = "pod"
    )]
    pub traffic_split_method: TrafficSplitMethod,

    /// Share of traffic for baseline plus canary (0-100)
    #[arg(long, global = true, env = "KROLL_PERCENTAGE", allow_negative_numbers = true)]
    pub percentage: Option<i32>,

    /// Fixed replica count for baseline and canary (0-100)
    #[arg(
        long,
        global = true,
        env = "KROLL_BASELINE_AND_CANARY_REPLICAS",
        allow_negative_numbers = true
    )]
    pub baseline_and_canary_replicas: Option<i32>,

    /// Pass --force to kubectl apply
    #[arg(long, global = true, env = "KROLL_FORCE")]
    pub force: bool,

    /// Pass --server-side to kubectl apply
    #[arg(long, global = true, env = "KROLL_SERVER_SIDE")]
    pub server_side: bool,

    /// kubectl timeout, e.g. "30s" or "5m"
    #[arg(long, global = true, env = "KROLL_TIMEOUT")]
    pub timeout: Option<String>,

    /// Annotation stamped on every applied object (key=value, repeatable)
    #[arg(
        long = "annotation",
        global = true,
        env = "KROLL_ANNOTATIONS",
        value_delimiter = ',',
        value_parser = parse_annotation
    )]
    pub annotations: Vec<(String, String)>,

    /// Namespace for every kubectl call
    #[arg(short, long, global = true, env = "KROLL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Manifest files
    #[arg(short = 'f', long = "manifest", global = true, env = "KROLL_MANIFESTS", value_delimiter = ',')]
    pub manifests: Vec<PathBuf>,
}

fn parse_annotation(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("annotation '{value}' must be key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("annotation '{value}' has an empty key"));
    }
    Ok((key.to_string(), val.trim().to_string()))
}

impl RolloutArgs {
    pub fn into_config(self) -> RolloutConfig {
        RolloutConfig {
            strategy: self.strategy,
            route_method: self.route_method,
            traffic_split_method: self.traffic_split_method,
            percentage: self.percentage,
            baseline_and_canary_replicas: self.baseline_and_canary_replicas,
            force: self.force,
            server_side: self.server_side,
            timeout: self.timeout,
            annotations: self.annotations.into_iter().collect::<BTreeMap<_, _>>(),
            namespace: self.namespace,
        }
    }
}
