use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use grid_core::{ErrorInfo, FieldMap, GridError, RunOptions};
use serde::{Deserialize, Serialize};

/// Everything a worker needs to run one experiment, serialized by the
/// controller at submission time and loaded on the allocated node.
///
/// Controller and worker share no process state; this file and the result
/// store are the only channels between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentManifest {
    /// The fully resolved binding, including provenance and the rendered command.
    pub binding: FieldMap,
    /// Rendered command line to execute.
    pub command: String,
    /// Sqlite store path.
    pub database: PathBuf,
    /// Result table name.
    pub table: String,
    /// Fields a parsed record must contain.
    pub expect: BTreeSet<String>,
    /// Fields excluded from dedup comparison.
    pub ignore: BTreeSet<String>,
    /// Built-in parser pattern, if the sweep configured one.
    pub parser_pattern: Option<String>,
    /// Options in effect when the job was submitted.
    pub options: RunOptions,
    /// Audit row created for this job at submission.
    pub audit_key: i64,
}

impl ExperimentManifest {
    /// Writes the manifest into `dir`, named by the given nonce.
    pub fn write(&self, dir: &Path, nonce: &str) -> Result<PathBuf, GridError> {
        fs::create_dir_all(dir).map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("manifest-mkdir", err.to_string())
                    .with_context("path", dir.display().to_string()),
            )
        })?;
        let path = dir.join(format!("manifest.{nonce}.json"));
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(&path, json).map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Ok(path)
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, GridError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            GridError::Worker(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
