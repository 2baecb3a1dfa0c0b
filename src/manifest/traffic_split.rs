//! SMI TrafficSplit wire format
//!
//! The API version is discovered from the cluster at runtime, so the type is
//! a plain serde struct rather than a derived custom resource.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Deserializer, Serialize};

pub const TRAFFIC_SPLIT_KIND: &str = "TrafficSplit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSplit {
    #[serde(default)]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: TrafficSplitSpec,
}

fn default_kind() -> String {
    TRAFFIC_SPLIT_KIND.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSplitSpec {
    /// Root service whose traffic is split
    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub backends: Vec<TrafficSplitBackend>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSplitBackend {
    pub service: String,

    /// Per-mille share of the root service's traffic
    #[serde(deserialize_with = "deserialize_weight")]
    pub weight: u32,
}

impl TrafficSplit {
    pub fn new(
        api_version: &str,
        name: String,
        service: &str,
        backends: Vec<TrafficSplitBackend>,
    ) -> Self {
        TrafficSplit {
            api_version: api_version.to_string(),
            kind: TRAFFIC_SPLIT_KIND.to_string(),
            metadata: ObjectMeta {
                name: Some(name),
                ..Default::default()
            },
            spec: TrafficSplitSpec {
                service: service.to_string(),
                backends,
            },
        }
    }

    /// Weight of the backend pointing at `service`, if any
    pub fn weight_of(&self, service: &str) -> Option<u32> {
        self.spec
            .backends
            .iter()
            .find(|backend| backend.service == service)
            .map(|backend| backend.weight)
    }

    pub fn total_weight(&self) -> u32 {
        self.spec.backends.iter().map(|backend| backend.weight).sum()
    }

    /// True when every expected backend is present with exactly that weight
    /// and no other backend exists
    pub fn has_weights(&self, expected: &[TrafficSplitBackend]) -> bool {
        self.spec.backends.len() == expected.len()
            && expected
                .iter()
                .all(|backend| self.weight_of(&backend.service) == Some(backend.weight))
    }
}

/// Accept integers as well as the quantity strings older SMI versions used
/// ("1000m", "500")
fn deserialize_weight<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawWeight {
        Number(u64),
        Text(String),
    }

    match RawWeight::deserialize(deserializer)? {
        RawWeight::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        RawWeight::Text(text) => {
            let text = text.trim();
            let digits = text.strip_suffix('m').unwrap_or(text);
            digits
                .parse::<u32>()
                .map_err(|e| serde::de::Error::custom(format!("invalid weight '{text}': {e}")))
        }
    }
}
