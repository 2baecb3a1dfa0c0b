use super::{ApplyOptions, DeleteTarget, ExecResult, Executor, ExecutorError};
use crate::manifest::{Manifest, ManifestError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

const TRAFFIC_SPLIT_GROUP: &str = "split.smi-spec.io/";

/// Executor backed by the kubectl binary on PATH
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    namespace: Option<String>,
}

impl Kubectl {
    pub fn new(namespace: Option<String>) -> Self {
        Kubectl {
            binary: "kubectl".to_string(),
            namespace,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn with_namespace(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(namespace) = &self.namespace {
            args.push("-n".to_string());
            args.push(namespace.clone());
        }
        args
    }

    fn apply_args(&self, files: &[PathBuf], options: &ApplyOptions) -> Vec<String> {
        let files = files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut args = vec!["apply".to_string(), "-f".to_string(), files];
        if options.force {
            args.push("--force".to_string());
        }
        if options.server_side {
            args.push("--server-side".to_string());
        }
        if let Some(timeout) = &options.timeout {
            args.push(format!("--timeout={timeout}"));
        }
        self.with_namespace(args)
    }

    fn get_args(&self, kind: &str, name: &str) -> Vec<String> {
        self.with_namespace(vec![
            "get".to_string(),
            format!("{kind}/{name}"),
            "-o".to_string(),
            "json".to_string(),
        ])
    }

    fn delete_args(&self, target: &DeleteTarget, timeout: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "delete".to_string(),
            target.kind.clone(),
            target.name.clone(),
            "--ignore-not-found=true".to_string(),
        ];
        if let Some(timeout) = timeout {
            args.push(format!("--timeout={timeout}"));
        }
        self.with_namespace(args)
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    async fn run(&self, args: &[String]) -> Result<ExecResult, ExecutorError> {
        let command = self.command_line(args);
        debug!(command = %command, "Running kubectl");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ExecutorError::Spawn {
                command: command.clone(),
                source,
            })?;

        let result = ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        if !result.success() {
            warn!(
                command = %command,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "kubectl exited with failure"
            );
        }
        Ok(result)
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(NotFound)") || stderr.contains(" not found")
}

/// Pick the highest `split.smi-spec.io` version from `kubectl api-versions`
/// output
///
/// Versions rank the way Kubernetes ranks them: GA above beta above alpha,
/// then by major and minor number.
pub fn latest_traffic_split_api_version(api_versions: &str) -> Option<String> {
    api_versions
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let version = line.strip_prefix(TRAFFIC_SPLIT_GROUP)?;
            Some((version_priority(version), line))
        })
        .max_by_key(|(priority, _)| *priority)
        .map(|(_, line)| line.to_string())
}

/// (stability, major, minor) where stability is 0 alpha, 1 beta, 2 GA
fn version_priority(version: &str) -> (u8, u32, u32) {
    let Some(rest) = version.strip_prefix('v') else {
        return (0, 0, 0);
    };
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let Ok(major) = rest[..digits].parse::<u32>() else {
        return (0, 0, 0);
    };
    let qualifier = &rest[digits..];
    if qualifier.is_empty() {
        return (2, major, 0);
    }
    let (stability, minor) = if let Some(minor) = qualifier.strip_prefix("beta") {
        (1, minor)
    } else if let Some(minor) = qualifier.strip_prefix("alpha") {
        (0, minor)
    } else {
        return (0, 0, 0);
    };
    (stability, major, minor.parse().unwrap_or(0))
}

#[async_trait]
impl Executor for Kubectl {
    async fn apply(
        &self,
        files: &[PathBuf],
        options: &ApplyOptions,
    ) -> Result<ExecResult, ExecutorError> {
        self.run(&self.apply_args(files, options)).await
    }

    async fn fetch(&self, kind: &str, name: &str) -> Result<Option<Manifest>, ExecutorError> {
        let args = self.get_args(kind, name);
        let result = self.run(&args).await?;

        if !result.success() {
            if is_not_found(&result.stderr) {
                debug!(kind = kind, name = name, "Object not found");
                return Ok(None);
            }
            return Err(ExecutorError::CommandFailed {
                command: self.command_line(&args),
                stderr: result.stderr,
            });
        }

        let value: Value =
            serde_json::from_str(&result.stdout).map_err(|source| ManifestError::Decode {
                kind: kind.to_string(),
                source,
            })?;
        Ok(Some(Manifest::from_value(value)?))
    }

    async fn delete(
        &self,
        targets: &[DeleteTarget],
        timeout: Option<&str>,
    ) -> Result<ExecResult, ExecutorError> {
        let mut combined = ExecResult::default();
        for target in targets {
            let result = self.run(&self.delete_args(target, timeout)).await?;
            combined.stdout.push_str(&result.stdout);
            combined.stderr.push_str(&result.stderr);
            if !result.success() {
                combined.exit_code = result.exit_code;
                break;
            }
        }
        Ok(combined)
    }

    async fn traffic_split_api_version(&self) -> Result<String, ExecutorError> {
        let args = vec!["api-versions".to_string()];
        let result = self.run(&args).await?;
        if !result.success() {
            return Err(ExecutorError::CommandFailed {
                command: self.command_line(&args),
                stderr: result.stderr,
            });
        }
        latest_traffic_split_api_version(&result.stdout)
            .ok_or(ExecutorError::TrafficSplitUnavailable)
    }
}
