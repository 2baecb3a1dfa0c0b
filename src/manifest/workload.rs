use super::{object_name, ManifestError};
use kube::core::DynamicObject;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Annotations the API server adds that must not be copied into a new object
const SERVER_ANNOTATIONS: [&str; 2] = [
    "kubectl.kubernetes.io/last-applied-configuration",
    "deployment.kubernetes.io/revision",
];

/// Workload kinds the engine derives variants for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Pod,
}

impl WorkloadKind {
    /// Kind matching is case-insensitive, as kubectl accepts either form
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "deployment" => Some(WorkloadKind::Deployment),
            "replicaset" => Some(WorkloadKind::ReplicaSet),
            "statefulset" => Some(WorkloadKind::StatefulSet),
            "daemonset" => Some(WorkloadKind::DaemonSet),
            "pod" => Some(WorkloadKind::Pod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Pod => "Pod",
        }
    }

    /// Whether `spec.replicas` is meaningful for this kind
    pub fn has_replicas(&self) -> bool {
        matches!(
            self,
            WorkloadKind::Deployment | WorkloadKind::ReplicaSet | WorkloadKind::StatefulSet
        )
    }

    /// Whether the kind owns pods through `spec.selector` and `spec.template`
    pub fn has_pod_template(&self) -> bool {
        !matches!(self, WorkloadKind::Pod)
    }
}

/// A deployment-like object
///
/// Kept as a `DynamicObject` so every field the user wrote survives the
/// round trip; only replicas, names and labels are touched.
#[derive(Debug, Clone)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub object: DynamicObject,
}

impl Workload {
    pub fn new(kind: WorkloadKind, object: DynamicObject) -> Self {
        Workload { kind, object }
    }

    pub fn name(&self) -> Result<&str, ManifestError> {
        object_name(&self.object.metadata)
    }

    /// Configured replica count; Kubernetes defaults a missing value to 1
    pub fn replicas(&self) -> i32 {
        if !self.kind.has_replicas() {
            return 0;
        }
        self.object
            .data
            .get("spec")
            .and_then(|spec| spec.get("replicas"))
            .and_then(Value::as_i64)
            .map(|r| r as i32)
            .unwrap_or(1)
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        if self.kind.has_replicas() {
            child_object(data_object(&mut self.object.data), "spec")
                .insert("replicas".to_string(), json!(replicas));
        }
        self
    }

    pub fn renamed(mut self, name: String) -> Self {
        self.object.metadata.name = Some(name);
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.object
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Set a label on the object, its selector and its pod template
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.object
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());

        if self.kind.has_pod_template() {
            let spec = child_object(data_object(&mut self.object.data), "spec");

            let selector = child_object(spec, "selector");
            child_object(selector, "matchLabels").insert(key.to_string(), json!(value));

            let template = child_object(spec, "template");
            let template_meta = child_object(template, "metadata");
            child_object(template_meta, "labels").insert(key.to_string(), json!(value));
        }
        self
    }

    /// Drop fields the API server populates so the object can be re-created
    /// under another name
    pub fn sanitized(mut self) -> Self {
        let metadata = &mut self.object.metadata;
        metadata.uid = None;
        metadata.resource_version = None;
        metadata.creation_timestamp = None;
        metadata.generation = None;
        metadata.managed_fields = None;
        metadata.self_link = None;
        metadata.owner_references = None;
        if let Some(annotations) = metadata.annotations.as_mut() {
            for key in SERVER_ANNOTATIONS {
                annotations.remove(key);
            }
        }

        data_object(&mut self.object.data).remove("status");
        self
    }
}

fn data_object(data: &mut Value) -> &mut Map<String, Value> {
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    match data {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Get `map[key]` as an object, replacing anything that is not one
fn child_object<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    data_object(map.entry(key.to_string()).or_insert(Value::Null))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manifest::fixtures;

    #[test]
    fn test_workload_kind_is_case_insensitive() {
        assert_eq!(
            WorkloadKind::from_kind("deployment"),
            Some(WorkloadKind::Deployment)
        );
        assert_eq!(
            WorkloadKind::from_kind("StatefulSet"),
            Some(WorkloadKind::StatefulSet)
        );
        assert_eq!(WorkloadKind::from_kind("Service"), None);
    }

    #[test]
    fn test_replicas_default_to_one() {
        let mut workload = fixtures::deployment("nginx-deployment", 3);
        assert_eq!(workload.replicas(), 3);

        data_object(&mut workload.object.data)
            .get_mut("spec")
            .and_then(Value::as_object_mut)
            .unwrap()
            .remove("replicas");
        assert_eq!(workload.replicas(), 1);
    }

    #[test]
    fn test_with_label_touches_selector_and_template() {
        let workload = fixtures::deployment("nginx-deployment", 3).with_label("workflow/version", "canary");

        assert_eq!(workload.label("workflow/version"), Some("canary"));
        let spec = &workload.object.data["spec"];
        assert_eq!(spec["selector"]["matchLabels"]["workflow/version"], "canary");
        assert_eq!(spec["selector"]["matchLabels"]["app"], "nginx");
        assert_eq!(
            spec["template"]["metadata"]["labels"]["workflow/version"],
            "canary"
        );
    }

    #[test]
    fn test_pod_label_only_touches_metadata() {
        let pod = fixtures::workload_from_yaml(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: debug
spec:
  containers:
  - name: shell
    image: busybox
"#,
        )
        .with_label("k8s.deploy.color", "green")
        .with_replicas(4);

        assert_eq!(pod.label("k8s.deploy.color"), Some("green"));
        assert!(pod.object.data["spec"].get("selector").is_none());
        assert!(pod.object.data["spec"].get("replicas").is_none());
    }

    #[test]
    fn test_sanitized_strips_server_fields() {
        let live = fixtures::workload_from_yaml(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx-deployment
  uid: 0b8f6c1e-1111-2222-3333-444455556666
  resourceVersion: "4711"
  generation: 7
  annotations:
    deployment.kubernetes.io/revision: "3"
    team: web
spec:
  replicas: 4
  selector:
    matchLabels:
      app: nginx
  template:
    metadata:
      labels:
        app: nginx
    spec:
      containers:
      - name: nginx
        image: nginx:1.25
status:
  readyReplicas: 4
"#,
        )
        .sanitized();

        let metadata = &live.object.metadata;
        assert!(metadata.uid.is_none());
        assert!(metadata.resource_version.is_none());
        assert!(metadata.generation.is_none());
        let annotations = metadata.annotations.as_ref().unwrap();
        assert!(!annotations.contains_key("deployment.kubernetes.io/revision"));
        assert_eq!(annotations.get("team").map(String::as_str), Some("web"));
        assert!(live.object.data.get("status").is_none());
        assert_eq!(live.replicas(), 4);
    }
}
