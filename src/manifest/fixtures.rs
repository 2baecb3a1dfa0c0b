//! Shared manifest fixtures for unit tests
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::io::parse_manifests;
use super::{Manifest, ManifestSet, Workload};
use k8s_openapi::api::core::v1::Service;
use std::path::Path;

pub const NGINX_SERVICE: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: nginx-service
spec:
  selector:
    app: nginx
  ports:
  - protocol: TCP
    port: 80
    targetPort: 80
"#;

pub const NGINX_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx-deployment
  labels:
    app: nginx
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
        ports:
        - containerPort: 80
"#;

pub const NGINX_INGRESS: &str = r#"
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: nginx-ingress
spec:
  rules:
  - http:
      paths:
      - path: /
        pathType: Prefix
        backend:
          service:
            name: nginx-service
            port:
              number: 80
"#;

pub const NGINX_CONFIG: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: nginx-config
data:
  index.html: hello
"#;

/// Service, Deployment, Ingress and ConfigMap in one multi-document file
pub const NGINX_MANIFESTS: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: nginx-service
spec:
  selector:
    app: nginx
  ports:
  - protocol: TCP
    port: 80
    targetPort: 80
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx-deployment
  labels:
    app: nginx
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
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: nginx-ingress
spec:
  rules:
  - http:
      paths:
      - path: /
        pathType: Prefix
        backend:
          service:
            name: nginx-service
            port:
              number: 80
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: nginx-config
data:
  index.html: hello
"#;

pub fn manifests_from_yaml(yaml: &str) -> Vec<Manifest> {
    parse_manifests(yaml, Path::new("fixture.yaml")).expect("fixture should parse")
}

pub fn manifest_set(documents: &[&str]) -> ManifestSet {
    documents
        .iter()
        .flat_map(|doc| manifests_from_yaml(doc))
        .collect()
}

pub fn workload_from_yaml(yaml: &str) -> Workload {
    match manifests_from_yaml(yaml).remove(0) {
        Manifest::Workload(workload) => workload,
        other => panic!("fixture is not a workload: {}", other.kind()),
    }
}

pub fn deployment(name: &str, replicas: i32) -> Workload {
    workload_from_yaml(NGINX_DEPLOYMENT)
        .renamed(name.to_string())
        .with_replicas(replicas)
}

pub fn service() -> Service {
    match manifests_from_yaml(NGINX_SERVICE).remove(0) {
        Manifest::Service(service) => service,
        other => panic!("fixture is not a service: {}", other.kind()),
    }
}
