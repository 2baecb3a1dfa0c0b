//! Per-invocation rollout context
//!
//! `Context` bundles everything a strategy needs for one phase: the executor,
//! the configuration, the temp directory derived manifests are written to
//! and the cached TrafficSplit API version.

pub mod weights;

use crate::config::RolloutConfig;
use crate::executor::{DeleteTarget, ExecResult, Executor, ExecutorError};
use crate::manifest::{Manifest, ManifestError, ManifestWorkspace};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid rollout configuration: {0}")]
    Validation(String),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("traffic is not routed as expected: {0}")]
    TrafficNotValidated(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One apply batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployResult {
    pub exec_result: ExecResult,
    pub manifest_files: Vec<PathBuf>,
}

/// Everything a phase applied and deleted, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub deploy_results: Vec<DeployResult>,
    pub deleted: Vec<DeleteTarget>,
}

impl PhaseOutcome {
    pub fn record_apply(&mut self, result: DeployResult) {
        if !result.manifest_files.is_empty() {
            self.deploy_results.push(result);
        }
    }

    pub fn record_delete(&mut self, targets: Vec<DeleteTarget>) {
        self.deleted.extend(targets);
    }

    /// Every manifest file applied during the phase
    pub fn manifest_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.deploy_results
            .iter()
            .flat_map(|result| result.manifest_files.iter())
    }
}

pub struct Context {
    pub executor: Arc<dyn Executor>,
    pub config: RolloutConfig,
    workspace: ManifestWorkspace,
    traffic_split_api_version: OnceCell<String>,
}

impl Context {
    pub fn new(executor: Arc<dyn Executor>, config: RolloutConfig) -> Result<Self, RolloutError> {
        Ok(Context {
            executor,
            config,
            workspace: ManifestWorkspace::new()?,
            traffic_split_api_version: OnceCell::new(),
        })
    }

    pub fn workspace(&self) -> &ManifestWorkspace {
        &self.workspace
    }

    /// Annotate, write and apply manifests as one batch
    ///
    /// An empty batch returns an empty result without calling the executor.
    /// A non-zero exit fails with the captured stderr.
    pub async fn apply(&self, mut manifests: Vec<Manifest>) -> Result<DeployResult, RolloutError> {
        if manifests.is_empty() {
            return Ok(DeployResult::default());
        }
        for manifest in manifests.iter_mut() {
            manifest.annotate(&self.config.annotations);
        }

        let files = self.workspace.write(&manifests)?;
        let exec_result = self
            .executor
            .apply(&files, &self.config.apply_options())
            .await?;

        if !exec_result.success() {
            error!(
                files = files.len(),
                exit_code = exec_result.exit_code,
                stderr = %exec_result.stderr.trim(),
                "Apply failed"
            );
            return Err(RolloutError::CommandFailed {
                command: "apply".to_string(),
                stderr: exec_result.stderr,
            });
        }

        info!(objects = manifests.len(), "Applied manifests");
        Ok(DeployResult {
            exec_result,
            manifest_files: files,
        })
    }

    /// Delete objects; absent ones are not an error
    pub async fn delete(&self, targets: Vec<DeleteTarget>) -> Result<Vec<DeleteTarget>, RolloutError> {
        if targets.is_empty() {
            return Ok(targets);
        }

        let result = self
            .executor
            .delete(&targets, self.config.timeout.as_deref())
            .await?;
        if !result.success() {
            error!(
                targets = targets.len(),
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "Delete failed"
            );
            return Err(RolloutError::CommandFailed {
                command: "delete".to_string(),
                stderr: result.stderr,
            });
        }

        for target in &targets {
            debug!(kind = %target.kind, name = %target.name, "Deleted");
        }
        info!(objects = targets.len(), "Deleted objects");
        Ok(targets)
    }

    pub async fn fetch(&self, kind: &str, name: &str) -> Result<Option<Manifest>, RolloutError> {
        Ok(self.executor.fetch(kind, name).await?)
    }

    /// TrafficSplit API version, asked of the cluster at most once
    pub async fn traffic_split_api_version(&self) -> Result<&str, RolloutError> {
        let version = self
            .traffic_split_api_version
            .get_or_try_init(|| async {
                let version = self.executor.traffic_split_api_version().await?;
                debug!(api_version = %version, "Resolved TrafficSplit API version");
                Ok::<_, RolloutError>(version)
            })
            .await?;
        Ok(version.as_str())
    }

    /// Create a Context over an in-memory cluster
    #[cfg(test)]
    #[allow(clippy::unwrap_used)] // Test helper - panicking is acceptable
    pub fn new_mock(config: RolloutConfig) -> (Self, Arc<crate::executor::mock::MockExecutor>) {
        let executor = Arc::new(crate::executor::mock::MockExecutor::new());
        let ctx = Context::new(executor.clone(), config).unwrap();
        (ctx, executor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "rollout_test.rs"]
mod tests;
