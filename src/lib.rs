//! kroll: one-shot progressive delivery steps for Kubernetes
//!
//! Each invocation runs a single rollout phase (deploy, promote or reject) for
//! either the canary or the blue-green strategy. Traffic is moved by one of
//! three routers: Service selector swaps, Ingress backend rewrites, or SMI
//! TrafficSplit weights.

pub mod actions;
pub mod cli;
pub mod config;
pub mod executor;
pub mod manifest;
pub mod rollout;
pub mod routing;
pub mod strategies;

pub use rollout::{Context, PhaseOutcome, RolloutError};
