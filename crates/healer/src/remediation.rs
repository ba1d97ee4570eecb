//! Deterministic, idempotent remediation of known failure kinds.
//!
//! Each remediated [`FailureKind`] maps to a declarative [`PatchDescriptor`]:
//! a guard block restored in the logic artifact plus a named regression test
//! ensured in the companion test artifact. Adding a kind means adding one
//! descriptor to [`PATCHES`].

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RemediationError;
use crate::types::{Diagnosis, FailureKind};

/// Logic artifact, relative to the target root.
pub const LOGIC_FILE: &str = "app/logic.py";
/// Companion test artifact, relative to the target root.
pub const TEST_FILE: &str = "tests/test_compute.py";

/// Unguarded operation every guard is inserted in front of.
const RETURN_ANCHOR: &str = "    return numerator / denominator\n";

/// How to remediate one failure kind.
#[derive(Debug)]
pub struct PatchDescriptor {
    pub kind: FailureKind,
    /// Guard block restored verbatim into the logic artifact
    pub guard: &'static str,
    /// Line the guard is inserted before
    pub anchor: &'static str,
    /// Regression test name; its presence means the test already exists
    pub test_name: &'static str,
    /// Snippet appended to the test artifact
    pub regression_test: &'static str,
}

pub const PATCHES: &[PatchDescriptor] = &[
    PatchDescriptor {
        kind: FailureKind::ZeroDivision,
        guard: "    # GUARD_ZERO_START\n    if denominator == 0:\n        raise ValueError(\"denominator must be non-zero\")\n    # GUARD_ZERO_END\n",
        anchor: RETURN_ANCHOR,
        test_name: "test_logic_zero_division_regression",
        regression_test: r#"

def test_logic_zero_division_regression():
    from app.logic import compute_ratio

    try:
        compute_ratio(1, 0)
    except ValueError as exc:
        assert "denominator must be non-zero" in str(exc)
    else:
        raise AssertionError("Expected ValueError for zero denominator")
"#,
    },
    PatchDescriptor {
        kind: FailureKind::NoneTypeError,
        guard: "    # GUARD_NONE_START\n    if numerator is None or denominator is None:\n        raise ValueError(\"numerator and denominator must be numbers\")\n    # GUARD_NONE_END\n",
        anchor: RETURN_ANCHOR,
        test_name: "test_logic_none_type_regression",
        regression_test: r#"

def test_logic_none_type_regression():
    from app.logic import compute_ratio

    try:
        compute_ratio(None, 2)
    except ValueError as exc:
        assert "must be numbers" in str(exc)
    else:
        raise AssertionError("Expected ValueError for None input")
"#,
    },
];

/// Descriptor for a kind, if it is remediated.
#[must_use]
pub fn descriptor_for(kind: FailureKind) -> Option<&'static PatchDescriptor> {
    PATCHES.iter().find(|p| p.kind == kind)
}

/// Whether the engine knows how to fix this kind.
#[must_use]
pub fn is_remediable(kind: FailureKind) -> bool {
    descriptor_for(kind).is_some()
}

/// Applies patch descriptors to artifacts under a target root.
#[derive(Debug, Clone)]
pub struct RemediationEngine {
    root: PathBuf,
    logic_file: String,
    test_file: String,
}

impl RemediationEngine {
    /// Engine over the default artifact layout under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_artifacts(root, LOGIC_FILE, TEST_FILE)
    }

    /// Engine over explicit artifact paths, relative to `root`.
    #[must_use]
    pub fn with_artifacts(root: impl Into<PathBuf>, logic_file: &str, test_file: &str) -> Self {
        Self {
            root: root.into(),
            logic_file: logic_file.to_string(),
            test_file: test_file.to_string(),
        }
    }

    #[must_use]
    pub fn logic_file(&self) -> &str {
        &self.logic_file
    }

    /// Every artifact a fix may touch, in the order fixes touch them.
    #[must_use]
    pub fn candidate_files(&self) -> Vec<String> {
        vec![self.logic_file.clone(), self.test_file.clone()]
    }

    /// Absolute path of an artifact identifier.
    #[must_use]
    pub fn resolve(&self, artifact: &str) -> PathBuf {
        self.root.join(artifact)
    }

    /// Apply the fix for a diagnosis.
    ///
    /// Returns the artifacts actually mutated, in the order they were touched.
    /// Unremediated kinds and already-fixed artifacts yield an empty list.
    /// `cancel` is checked before each artifact step.
    pub fn apply_fix(
        &self,
        diagnosis: &Diagnosis,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RemediationError> {
        let Some(patch) = descriptor_for(diagnosis.kind) else {
            debug!(kind = %diagnosis.kind, "No remediation registered");
            return Ok(Vec::new());
        };

        let mut changed = Vec::new();

        check_cancelled(cancel)?;
        if self.restore_guard(patch)? {
            changed.push(self.logic_file.clone());
        }

        check_cancelled(cancel)?;
        if self.ensure_regression_test(patch)? {
            changed.push(self.test_file.clone());
        }

        info!(kind = %diagnosis.kind, changed = ?changed, "Remediation applied");
        Ok(changed)
    }

    fn restore_guard(&self, patch: &PatchDescriptor) -> Result<bool, RemediationError> {
        let path = self.resolve(&self.logic_file);
        let source = read(&path)?;
        if source.contains(patch.guard) {
            return Ok(false);
        }

        if !source.contains(patch.anchor) {
            return Err(RemediationError::AnchorNotFound {
                path,
                anchor: patch.anchor.to_string(),
            });
        }

        let patched = source.replacen(patch.anchor, &format!("{}{}", patch.guard, patch.anchor), 1);
        write(&path, &patched)?;
        Ok(true)
    }

    fn ensure_regression_test(&self, patch: &PatchDescriptor) -> Result<bool, RemediationError> {
        let path = self.resolve(&self.test_file);
        let source = read(&path)?;
        if source.contains(patch.test_name) {
            return Ok(false);
        }

        let updated = format!(
            "{}\n{}\n",
            source.trim_end(),
            patch.regression_test.trim()
        );
        write(&path, &updated)?;
        Ok(true)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), RemediationError> {
    if cancel.is_cancelled() {
        return Err(RemediationError::Cancelled);
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, RemediationError> {
    std::fs::read_to_string(path).map_err(|source| RemediationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), RemediationError> {
    std::fs::write(path, contents).map_err(|source| RemediationError::Io {
        path: path.to_path_buf(),
        source,
    })
}
