//! Cluster command execution
//!
//! Every mutation the engine performs goes through the [`Executor`] trait.
//! Production code uses [`Kubectl`], which shells out to the kubectl binary.
//! Tests use `MockExecutor`, which keeps an in-memory view of the cluster and
//! records every call for assertions.

mod kubectl;
#[cfg(test)]
pub(crate) mod mock;

pub use kubectl::{latest_traffic_split_api_version, Kubectl};

use crate::manifest::{Manifest, ManifestError};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to decode fetched object: {0}")]
    Parse(#[from] ManifestError),

    #[error("cluster does not serve any split.smi-spec.io API version")]
    TrafficSplitUnavailable,
}

/// Captured output of one executor call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Flags passed through to every apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub force: bool,
    pub server_side: bool,
    /// kubectl duration string such as "90s"
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteTarget {
    pub name: String,
    pub kind: String,
}

impl DeleteTarget {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        DeleteTarget {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Runs commands against the cluster
///
/// A non-zero exit from `apply` or `delete` is reported through
/// [`ExecResult::exit_code`], not as an error, so callers can surface the
/// captured stderr. `Err` means the command could not be run at all.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn apply(
        &self,
        files: &[PathBuf],
        options: &ApplyOptions,
    ) -> Result<ExecResult, ExecutorError>;

    /// Fetch a live object; `Ok(None)` when it does not exist
    async fn fetch(&self, kind: &str, name: &str) -> Result<Option<Manifest>, ExecutorError>;

    /// Delete objects, tolerating ones that are already gone
    async fn delete(
        &self,
        targets: &[DeleteTarget],
        timeout: Option<&str>,
    ) -> Result<ExecResult, ExecutorError>;

    /// Highest TrafficSplit API version the cluster serves
    async fn traffic_split_api_version(&self) -> Result<String, ExecutorError>;
}
