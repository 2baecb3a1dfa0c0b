//! In-memory executor for tests
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{ApplyOptions, DeleteTarget, ExecResult, Executor, ExecutorError};
use crate::manifest::{read_manifests, Manifest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

pub const MOCK_TRAFFIC_SPLIT_API_VERSION: &str = "split.smi-spec.io/v1alpha3";

/// One recorded executor call
#[derive(Debug, Clone)]
pub enum Call {
    Apply {
        manifests: Vec<Manifest>,
        options: ApplyOptions,
    },
    Fetch {
        kind: String,
        name: String,
    },
    Delete {
        targets: Vec<DeleteTarget>,
        timeout: Option<String>,
    },
    ApiVersion,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Apply { .. } | Call::Delete { .. })
    }
}

type ObjectKey = (String, String);

fn key(kind: &str, name: &str) -> ObjectKey {
    (kind.to_ascii_lowercase(), name.to_string())
}

/// Executor that applies into a map instead of a cluster
///
/// Applied files are read back so tests assert on the exact objects that
/// would have reached kubectl.
#[derive(Default)]
pub struct MockExecutor {
    objects: Mutex<HashMap<ObjectKey, Manifest>>,
    calls: Mutex<Vec<Call>>,
    apply_failure: Mutex<Option<String>>,
    broken_fetches: Mutex<HashSet<ObjectKey>>,
    api_version: Mutex<Option<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        let mock = MockExecutor::default();
        *mock.api_version.lock().unwrap() = Some(MOCK_TRAFFIC_SPLIT_API_VERSION.to_string());
        mock
    }

    /// Seed a live object
    pub fn insert(&self, manifest: Manifest) {
        let name = manifest.name().unwrap().to_string();
        self.objects
            .lock()
            .unwrap()
            .insert(key(manifest.kind(), &name), manifest);
    }

    pub fn object(&self, kind: &str, name: &str) -> Option<Manifest> {
        self.objects.lock().unwrap().get(&key(kind, name)).cloned()
    }

    /// Make every following apply exit non-zero with this stderr
    pub fn fail_applies(&self, stderr: &str) {
        *self.apply_failure.lock().unwrap() = Some(stderr.to_string());
    }

    /// Make fetching this object fail as if the API server errored
    pub fn break_fetch(&self, kind: &str, name: &str) {
        self.broken_fetches.lock().unwrap().insert(key(kind, name));
    }

    /// Simulate a cluster without the SMI CRDs
    pub fn without_traffic_split_api(&self) {
        *self.api_version.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Objects of each apply call, in order
    pub fn applied(&self) -> Vec<Vec<Manifest>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Apply { manifests, .. } => Some(manifests),
                _ => None,
            })
            .collect()
    }

    /// `Kind/name` of each applied object, one inner list per apply call
    pub fn applied_names(&self) -> Vec<Vec<String>> {
        self.applied()
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|m| format!("{}/{}", m.kind(), m.name().unwrap()))
                    .collect()
            })
            .collect()
    }

    /// Targets of every delete call, flattened in order
    pub fn deleted(&self) -> Vec<DeleteTarget> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { targets, .. } => Some(targets),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn api_version_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::ApiVersion))
            .count()
    }

    pub fn mutations(&self) -> usize {
        self.calls().iter().filter(|call| call.is_mutation()).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn apply(
        &self,
        files: &[PathBuf],
        options: &ApplyOptions,
    ) -> Result<ExecResult, ExecutorError> {
        let manifests = read_manifests(files)?;
        self.record(Call::Apply {
            manifests: manifests.clone(),
            options: options.clone(),
        });

        if let Some(stderr) = self.apply_failure.lock().unwrap().clone() {
            return Ok(ExecResult {
                stdout: String::new(),
                stderr,
                exit_code: 1,
            });
        }

        let count = manifests.len();
        for manifest in manifests {
            self.insert(manifest);
        }
        Ok(ExecResult {
            stdout: format!("{count} configured"),
            ..Default::default()
        })
    }

    async fn fetch(&self, kind: &str, name: &str) -> Result<Option<Manifest>, ExecutorError> {
        self.record(Call::Fetch {
            kind: kind.to_string(),
            name: name.to_string(),
        });
        if self.broken_fetches.lock().unwrap().contains(&key(kind, name)) {
            return Err(ExecutorError::CommandFailed {
                command: format!("kubectl get {kind}/{name}"),
                stderr: "Unable to connect to the server".to_string(),
            });
        }
        Ok(self.object(kind, name))
    }

    async fn delete(
        &self,
        targets: &[DeleteTarget],
        timeout: Option<&str>,
    ) -> Result<ExecResult, ExecutorError> {
        self.record(Call::Delete {
            targets: targets.to_vec(),
            timeout: timeout.map(str::to_string),
        });
        let mut objects = self.objects.lock().unwrap();
        for target in targets {
            objects.remove(&key(&target.kind, &target.name));
        }
        Ok(ExecResult::default())
    }

    async fn traffic_split_api_version(&self) -> Result<String, ExecutorError> {
        self.record(Call::ApiVersion);
        self.api_version
            .lock()
            .unwrap()
            .clone()
            .ok_or(ExecutorError::TrafficSplitUnavailable)
    }
}
