//! Manifest model
//!
//! Input documents are parsed into a tagged union so strategy code can branch
//! on kind with exhaustive matching instead of string comparisons. Kinds the
//! engine does not know about are kept as opaque `DynamicObject`s and passed
//! through untouched.

pub mod io;
pub mod naming;
mod traffic_split;
mod workload;

pub use io::{read_manifest_file, read_manifests, ManifestWorkspace};
pub use traffic_split::{TrafficSplit, TrafficSplitBackend, TrafficSplitSpec, TRAFFIC_SPLIT_KIND};
pub use workload::{Workload, WorkloadKind};

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
pub(crate) mod fixtures;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is missing metadata.name")]
    MissingName,

    #[error("manifest is missing kind")]
    MissingKind,

    #[error("failed to parse manifest file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to decode {kind} manifest: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode manifest: {0}")]
    Encode(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ManifestError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Coarse classification that drives every downstream branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    Workload,
    Service,
    Ingress,
    Other,
}

/// A single cluster object
#[derive(Debug, Clone)]
pub enum Manifest {
    Workload(Workload),
    Service(Service),
    Ingress(Ingress),
    TrafficSplit(TrafficSplit),
    Other(DynamicObject),
}

/// Name of an object, failing on a missing or empty `metadata.name`
pub fn object_name(metadata: &ObjectMeta) -> Result<&str, ManifestError> {
    metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(ManifestError::MissingName)
}

impl Manifest {
    /// Decode an untyped document, narrowing known kinds to typed variants
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(ManifestError::MissingKind)?
            .to_string();
        let decode = |source| ManifestError::Decode {
            kind: kind.clone(),
            source,
        };

        if let Some(workload_kind) = WorkloadKind::from_kind(&kind) {
            let object: DynamicObject = serde_json::from_value(value).map_err(decode)?;
            return Ok(Manifest::Workload(Workload::new(workload_kind, object)));
        }

        let manifest = match kind.as_str() {
            "Service" => Manifest::Service(serde_json::from_value(value).map_err(decode)?),
            "Ingress" => Manifest::Ingress(serde_json::from_value(value).map_err(decode)?),
            TRAFFIC_SPLIT_KIND => {
                Manifest::TrafficSplit(serde_json::from_value(value).map_err(decode)?)
            }
            _ => Manifest::Other(serde_json::from_value(value).map_err(decode)?),
        };
        Ok(manifest)
    }

    pub fn to_value(&self) -> Result<Value, ManifestError> {
        let encoded = match self {
            Manifest::Workload(workload) => serde_json::to_value(&workload.object),
            Manifest::Service(service) => serde_json::to_value(service),
            Manifest::Ingress(ingress) => serde_json::to_value(ingress),
            Manifest::TrafficSplit(split) => serde_json::to_value(split),
            Manifest::Other(object) => serde_json::to_value(object),
        };
        encoded.map_err(|e| ManifestError::Encode(e.to_string()))
    }

    pub fn class(&self) -> EntityClass {
        match self {
            Manifest::Workload(_) => EntityClass::Workload,
            Manifest::Service(_) => EntityClass::Service,
            Manifest::Ingress(_) => EntityClass::Ingress,
            Manifest::TrafficSplit(_) | Manifest::Other(_) => EntityClass::Other,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Manifest::Workload(workload) => workload.kind.as_str(),
            Manifest::Service(_) => "Service",
            Manifest::Ingress(_) => "Ingress",
            Manifest::TrafficSplit(_) => TRAFFIC_SPLIT_KIND,
            Manifest::Other(object) => object
                .types
                .as_ref()
                .map(|types| types.kind.as_str())
                .unwrap_or_default(),
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Manifest::Workload(workload) => &workload.object.metadata,
            Manifest::Service(service) => &service.metadata,
            Manifest::Ingress(ingress) => &ingress.metadata,
            Manifest::TrafficSplit(split) => &split.metadata,
            Manifest::Other(object) => &object.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Manifest::Workload(workload) => &mut workload.object.metadata,
            Manifest::Service(service) => &mut service.metadata,
            Manifest::Ingress(ingress) => &mut ingress.metadata,
            Manifest::TrafficSplit(split) => &mut split.metadata,
            Manifest::Other(object) => &mut object.metadata,
        }
    }

    pub fn name(&self) -> Result<&str, ManifestError> {
        object_name(self.metadata())
    }

    /// Stamp annotations onto the object's metadata
    pub fn annotate(&mut self, annotations: &BTreeMap<String, String>) {
        if annotations.is_empty() {
            return;
        }
        self.metadata_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl From<Workload> for Manifest {
    fn from(workload: Workload) -> Self {
        Manifest::Workload(workload)
    }
}

impl From<Service> for Manifest {
    fn from(service: Service) -> Self {
        Manifest::Service(service)
    }
}

impl From<Ingress> for Manifest {
    fn from(ingress: Ingress) -> Self {
        Manifest::Ingress(ingress)
    }
}

impl From<TrafficSplit> for Manifest {
    fn from(split: TrafficSplit) -> Self {
        Manifest::TrafficSplit(split)
    }
}

/// The ordered manifests of one invocation
///
/// Input order is preserved; the accessors partition by class without
/// reordering.
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    manifests: Vec<Manifest>,
}

impl ManifestSet {
    pub fn new(manifests: Vec<Manifest>) -> Self {
        ManifestSet { manifests }
    }

    /// Parse every file; any failure aborts the whole batch
    pub fn load(paths: &[PathBuf]) -> Result<Self, ManifestError> {
        Ok(Self::new(read_manifests(paths)?))
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.iter()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &Workload> {
        self.manifests.iter().filter_map(|m| match m {
            Manifest::Workload(workload) => Some(workload),
            _ => None,
        })
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.manifests.iter().filter_map(|m| match m {
            Manifest::Service(service) => Some(service),
            _ => None,
        })
    }

    pub fn ingresses(&self) -> impl Iterator<Item = &Ingress> {
        self.manifests.iter().filter_map(|m| match m {
            Manifest::Ingress(ingress) => Some(ingress),
            _ => None,
        })
    }

    pub fn non_workloads(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests
            .iter()
            .filter(|m| m.class() != EntityClass::Workload)
    }
}

impl FromIterator<Manifest> for ManifestSet {
    fn from_iter<I: IntoIterator<Item = Manifest>>(iter: I) -> Self {
        ManifestSet::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "manifest_test.rs"]
mod tests;
