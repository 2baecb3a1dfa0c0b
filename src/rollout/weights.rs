//! Replica and traffic weight arithmetic
//!
//! Weights are per-mille. Every split built here sums to exactly
//! [`MAX_WEIGHT`], whatever the percentage.

use crate::manifest::naming::{variant_name, GreenLabel, Variant};
use crate::manifest::TrafficSplitBackend;

pub const MIN_WEIGHT: u32 = 0;
pub const MAX_WEIGHT: u32 = 1000;

/// Accept a percentage in `0..=100`
pub fn validate_percentage(percentage: i32) -> Result<u32, String> {
    if !(0..=100).contains(&percentage) {
        return Err(format!("percentage must be between 0 and 100, got {percentage}"));
    }
    Ok(percentage as u32)
}

/// Accept an explicit baseline/canary replica count in `0..=100`
pub fn validate_replica_override(replicas: i32) -> Result<i32, String> {
    if replicas < 0 || replicas > 100 {
        return Err(format!(
            "baseline-and-canary-replicas must be between 0 and 100, got {replicas}"
        ));
    }
    Ok(replicas)
}

/// Replicas for a canary (and its baseline) at `percentage` of `base_replicas`
///
/// Rounds half away from zero and never returns less than one, so a canary
/// always has a pod to route to.
pub fn canary_replica_count(base_replicas: i32, percentage: u32) -> i32 {
    let scaled = (f64::from(base_replicas.max(0)) * f64::from(percentage) / 100.0).round();
    (scaled as i32).max(1)
}

/// Traffic shares of the three canary backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanaryWeights {
    pub stable: u32,
    pub baseline: u32,
    pub canary: u32,
}

impl CanaryWeights {
    /// Split `percentage` evenly between baseline and canary
    pub fn for_percentage(percentage: u32) -> Self {
        let share = percentage.min(100) * 10;
        CanaryWeights {
            stable: MAX_WEIGHT - share,
            baseline: share / 2,
            canary: share / 2,
        }
    }

    pub fn all_stable() -> Self {
        CanaryWeights {
            stable: MAX_WEIGHT,
            baseline: MIN_WEIGHT,
            canary: MIN_WEIGHT,
        }
    }

    pub fn all_canary() -> Self {
        CanaryWeights {
            stable: MIN_WEIGHT,
            baseline: MIN_WEIGHT,
            canary: MAX_WEIGHT,
        }
    }

    pub fn total(&self) -> u32 {
        self.stable + self.baseline + self.canary
    }
}

/// Traffic shares of the two blue-green backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlueGreenWeights {
    pub stable: u32,
    pub green: u32,
}

impl BlueGreenWeights {
    pub fn for_label(label: GreenLabel) -> Self {
        match label {
            GreenLabel::None => BlueGreenWeights {
                stable: MAX_WEIGHT,
                green: MIN_WEIGHT,
            },
            GreenLabel::Green => BlueGreenWeights {
                stable: MIN_WEIGHT,
                green: MAX_WEIGHT,
            },
        }
    }

    /// The label whose version receives all traffic
    pub fn label(&self) -> GreenLabel {
        if self.green == MAX_WEIGHT {
            GreenLabel::Green
        } else {
            GreenLabel::None
        }
    }
}

/// Target traffic distribution handed to a router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weights {
    Canary(CanaryWeights),
    BlueGreen(BlueGreenWeights),
}

impl Weights {
    /// TrafficSplit backends for `service`, in stable-first order
    pub fn backends(&self, service: &str) -> Vec<TrafficSplitBackend> {
        let backend = |variant, weight| TrafficSplitBackend {
            service: variant_name(service, variant),
            weight,
        };
        match self {
            Weights::Canary(w) => vec![
                backend(Variant::Stable, w.stable),
                backend(Variant::Baseline, w.baseline),
                backend(Variant::Canary, w.canary),
            ],
            Weights::BlueGreen(w) => vec![
                backend(Variant::Stable, w.stable),
                backend(Variant::Green, w.green),
            ],
        }
    }

    /// Blue-green label implied by the weights; canary weights map to
    /// `Green` only when canary carries all traffic
    pub fn label(&self) -> GreenLabel {
        match self {
            Weights::BlueGreen(w) => w.label(),
            Weights::Canary(w) if w.canary == MAX_WEIGHT => GreenLabel::Green,
            Weights::Canary(_) => GreenLabel::None,
        }
    }
}

impl From<CanaryWeights> for Weights {
    fn from(weights: CanaryWeights) -> Self {
        Weights::Canary(weights)
    }
}

impl From<BlueGreenWeights> for Weights {
    fn from(weights: BlueGreenWeights) -> Self {
        Weights::BlueGreen(weights)
    }
}
