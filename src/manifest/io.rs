//! Manifest files in and out
//!
//! Input files may hold several YAML documents. Derived objects are written one
//! per file into a temp directory that lives as long as the invocation.

use super::{Manifest, ManifestError};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tracing::{debug, error};

/// Parse every document in a YAML string; empty documents are skipped
pub fn parse_manifests(contents: &str, path: &Path) -> Result<Vec<Manifest>, ManifestError> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(contents) {
        let value = Value::deserialize(document).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if value.is_null() {
            continue;
        }
        manifests.push(Manifest::from_value(value)?);
    }
    Ok(manifests)
}

pub fn read_manifest_file(path: &Path) -> Result<Vec<Manifest>, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
    parse_manifests(&contents, path)
}

/// Read all files in order
///
/// The first failing file aborts the batch; a partial set is never returned.
pub fn read_manifests(paths: &[PathBuf]) -> Result<Vec<Manifest>, ManifestError> {
    let mut manifests = Vec::new();
    for path in paths {
        match read_manifest_file(path) {
            Ok(parsed) => {
                debug!(path = %path.display(), objects = parsed.len(), "Read manifest file");
                manifests.extend(parsed);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to process manifest file");
                return Err(e);
            }
        }
    }
    Ok(manifests)
}

/// Invocation-scoped directory for generated manifest files
///
/// Files are removed when the workspace is dropped.
#[derive(Debug)]
pub struct ManifestWorkspace {
    dir: TempDir,
    counter: AtomicUsize,
}

impl ManifestWorkspace {
    pub fn new() -> Result<Self, ManifestError> {
        let dir = tempfile::Builder::new()
            .prefix("kroll-")
            .tempdir()
            .map_err(|e| ManifestError::io(&std::env::temp_dir(), e))?;
        Ok(ManifestWorkspace {
            dir,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write one file per manifest, returning paths in input order
    pub fn write(&self, manifests: &[Manifest]) -> Result<Vec<PathBuf>, ManifestError> {
        manifests
            .iter()
            .map(|manifest| {
                let document = serde_yaml::to_string(&manifest.to_value()?)
                    .map_err(|e| ManifestError::Encode(e.to_string()))?;
                self.write_raw(&document, manifest.kind(), manifest.name()?)
            })
            .collect()
    }

    /// Write a single serialized document tagged by kind and name
    pub fn write_raw(&self, document: &str, kind: &str, name: &str) -> Result<PathBuf, ManifestError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let file_name = format!("{}_{}_{}.yaml", kind.to_ascii_lowercase(), name, index);
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, document).map_err(|e| ManifestError::io(&path, e))?;
        debug!(path = %path.display(), kind = kind, name = name, "Wrote manifest file");
        Ok(path)
    }
}
