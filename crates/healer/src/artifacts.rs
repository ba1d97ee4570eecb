//! Persisted run artifacts: patch diff and incident records.

use std::path::PathBuf;

use serde::Serialize;
use similar::TextDiff;

use crate::error::ArtifactError;

pub const PATCH_FILE: &str = "healing_patch.diff";
pub const INCIDENT_FILE: &str = "incident_report.json";
pub const RUNTIME_INCIDENT_FILE: &str = "runtime_incident_report.json";

/// Directory holding the artifacts of the latest run. Each write overwrites.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write the unified diff (possibly empty).
    pub fn write_patch(&self, diff: &str) -> Result<PathBuf, ArtifactError> {
        self.write(PATCH_FILE, diff)
    }

    /// Write the offline incident record.
    pub fn write_incident<T: Serialize>(&self, record: &T) -> Result<PathBuf, ArtifactError> {
        self.write_json(INCIDENT_FILE, record)
    }

    /// Write the watchdog runtime incident record.
    pub fn write_runtime_incident<T: Serialize>(&self, record: &T) -> Result<PathBuf, ArtifactError> {
        self.write_json(RUNTIME_INCIDENT_FILE, record)
    }

    fn write_json<T: Serialize>(&self, name: &str, record: &T) -> Result<PathBuf, ArtifactError> {
        let mut contents = serde_json::to_string_pretty(record)?;
        contents.push('\n');
        self.write(name, &contents)
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf, ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path(name);
        std::fs::write(&path, contents).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Unified diff of one artifact, or `None` when the content is unchanged.
#[must_use]
pub fn unified_diff(artifact: &str, before: &str, after: &str) -> Option<String> {
    if before == after {
        return None;
    }
    let diff = TextDiff::from_lines(before, after)
        .unified_diff()
        .header(&format!("a/{artifact}"), &format!("b/{artifact}"))
        .to_string();
    Some(diff)
}
