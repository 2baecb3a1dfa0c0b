//! Variant names and version labels
//!
//! Derivation is a pure function of (base name, variant). Deriving a name that
//! already carries the variant's suffix returns it unchanged, so re-running a
//! phase never produces `app-canary-canary`.

/// Label carried by canary, baseline and stable variants
pub const CANARY_VERSION_LABEL: &str = "workflow/version";

/// Label carried by blue-green objects
pub const BLUE_GREEN_VERSION_LABEL: &str = "k8s.deploy.color";

const CANARY_TRAFFIC_SPLIT_SUFFIX: &str = "-workflow-rollout";
const BLUE_GREEN_TRAFFIC_SPLIT_SUFFIX: &str = "-trafficsplit";

/// Role a derived object plays in a rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Stable,
    Baseline,
    Canary,
    Green,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Stable,
        Variant::Baseline,
        Variant::Canary,
        Variant::Green,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Variant::Stable => "-stable",
            Variant::Baseline => "-baseline",
            Variant::Canary => "-canary",
            Variant::Green => "-green",
        }
    }

    /// Value written under [`CANARY_VERSION_LABEL`]
    pub fn label_value(&self) -> &'static str {
        match self {
            Variant::Stable => "stable",
            Variant::Baseline => "baseline",
            Variant::Canary => "canary",
            Variant::Green => "green",
        }
    }
}

/// Blue-green version label state of a Service, Ingress or workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreenLabel {
    /// No green version is routed; the object serves stable
    None,
    Green,
}

impl GreenLabel {
    pub fn value(&self) -> &'static str {
        match self {
            GreenLabel::None => "None",
            GreenLabel::Green => "green",
        }
    }
}

pub fn variant_name(base: &str, variant: Variant) -> String {
    if base.ends_with(variant.suffix()) {
        base.to_string()
    } else {
        format!("{base}{}", variant.suffix())
    }
}

/// Strip a variant suffix, if present
pub fn base_name(name: &str) -> &str {
    Variant::ALL
        .iter()
        .find_map(|variant| name.strip_suffix(variant.suffix()))
        .unwrap_or(name)
}

pub fn canary_traffic_split_name(service: &str) -> String {
    format!("{service}{CANARY_TRAFFIC_SPLIT_SUFFIX}")
}

pub fn blue_green_traffic_split_name(service: &str) -> String {
    format!("{service}{BLUE_GREEN_TRAFFIC_SPLIT_SUFFIX}")
}
