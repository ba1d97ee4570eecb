//! Offline heal loop: verify, classify, remediate, re-verify, record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifacts::{unified_diff, ArtifactStore};
use crate::classifier::classify;
use crate::error::ArtifactError;
use crate::remediation::{is_remediable, RemediationEngine};
use crate::types::FailureKind;

/// Default verification command, run from the target root.
pub const DEFAULT_VERIFY_COMMAND: &str = "python -m pytest";

/// Result of one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub returncode: i32,
    /// Combined stdout and stderr
    pub output: String,
}

impl TestRun {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.returncode == 0
    }

    fn summary(&self) -> TestSummary {
        TestSummary {
            passed: self.passed(),
            returncode: self.returncode,
        }
    }
}

/// External verification collaborator.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Run verification once. Spawn failures are reported as a failed run.
    async fn verify(&self) -> TestRun;
}

/// Runs a shell-free command line in the target root.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandVerifier {
    /// Split `command` on whitespace; the first word is the program.
    pub fn parse(command: &str, cwd: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("verification command is empty"))?;
        Ok(Self {
            program,
            args: words.collect(),
            cwd: cwd.into(),
        })
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self) -> TestRun {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .output()
            .await;

        match output {
            Ok(output) => TestRun {
                returncode: output.status.code().unwrap_or(-1),
                output: format!(
                    "{}\n{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            },
            Err(e) => {
                error!(program = %self.program, error = %e, "Failed to run verification command");
                TestRun {
                    returncode: -1,
                    output: format!("failed to run {}: {e}", self.program),
                }
            }
        }
    }
}

/// Terminal status of an offline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Verification already passed; nothing to heal
    Noop,
    Healed,
    Failed,
}

impl IncidentStatus {
    /// Process exit code: success only for `Healed`.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Healed => 0,
            Self::Noop | Self::Failed => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub passed: bool,
    pub returncode: i32,
}

/// Incident record written after every offline run.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRecord {
    pub timestamp: DateTime<Utc>,
    pub status: IncidentStatus,
    pub failure_type: FailureKind,
    pub files_modified: Vec<String>,
    pub tests_before: TestSummary,
    pub tests_after: Option<TestSummary>,
    pub classifier: Value,
}

/// Batch front-end over the classifier and remediation engine.
pub struct OfflineRunner<V> {
    verifier: V,
    engine: RemediationEngine,
    store: ArtifactStore,
}

impl<V: Verifier> OfflineRunner<V> {
    #[must_use]
    pub fn new(verifier: V, engine: RemediationEngine, store: ArtifactStore) -> Self {
        Self {
            verifier,
            engine,
            store,
        }
    }

    /// Run once. Never fails; every outcome is recorded and mapped to a status.
    pub async fn run(&self) -> IncidentStatus {
        match self.try_run().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Failed to persist heal artifacts");
                IncidentStatus::Failed
            }
        }
    }

    async fn try_run(&self) -> Result<IncidentStatus, ArtifactError> {
        let before = self.verifier.verify().await;

        if before.passed() {
            info!("No failing tests detected. Nothing to heal.");
            self.store.write_patch("")?;
            self.record(
                IncidentStatus::Noop,
                FailureKind::Unknown,
                Vec::new(),
                &before,
                Some(&before),
                json!({"message": "No failing tests to heal."}),
            )?;
            return Ok(IncidentStatus::Noop);
        }

        let diagnosis = classify(&before.output);
        let mut detail = serde_json::to_value(&diagnosis)?;

        if !is_remediable(diagnosis.kind) {
            warn!(kind = %diagnosis.kind, "Unsupported failure type");
            self.store.write_patch("")?;
            self.record(
                IncidentStatus::Failed,
                diagnosis.kind,
                Vec::new(),
                &before,
                None,
                detail,
            )?;
            return Ok(IncidentStatus::Failed);
        }

        let snapshot = self.snapshot();
        let changed = match self.engine.apply_fix(&diagnosis, &CancellationToken::new()) {
            Ok(changed) => changed,
            Err(e) => {
                error!(error = %e, "Remediation failed");
                detail["remediation_error"] = json!(e.to_string());
                self.store.write_patch("")?;
                self.record(
                    IncidentStatus::Failed,
                    diagnosis.kind,
                    Vec::new(),
                    &before,
                    None,
                    detail,
                )?;
                return Ok(IncidentStatus::Failed);
            }
        };

        let after = self.verifier.verify().await;
        self.store.write_patch(&self.diff(&snapshot, &changed))?;

        let status = if after.passed() {
            info!("Healing succeeded. Tests are passing.");
            IncidentStatus::Healed
        } else {
            warn!("Healing attempted but tests are still failing.");
            IncidentStatus::Failed
        };
        self.record(status, diagnosis.kind, changed, &before, Some(&after), detail)?;
        Ok(status)
    }

    /// Pre-fix content of every artifact the fix might touch.
    fn snapshot(&self) -> BTreeMap<String, String> {
        self.engine
            .candidate_files()
            .into_iter()
            .filter_map(|artifact| {
                std::fs::read_to_string(self.engine.resolve(&artifact))
                    .ok()
                    .map(|content| (artifact, content))
            })
            .collect()
    }

    fn diff(&self, snapshot: &BTreeMap<String, String>, changed: &[String]) -> String {
        changed
            .iter()
            .filter_map(|artifact| {
                let before = snapshot.get(artifact)?;
                let after = std::fs::read_to_string(self.engine.resolve(artifact)).ok()?;
                unified_diff(artifact, before, &after)
            })
            .collect()
    }

    fn record(
        &self,
        status: IncidentStatus,
        failure_type: FailureKind,
        files_modified: Vec<String>,
        before: &TestRun,
        after: Option<&TestRun>,
        classifier: Value,
    ) -> Result<(), ArtifactError> {
        let record = IncidentRecord {
            timestamp: Utc::now(),
            status,
            failure_type,
            files_modified,
            tests_before: before.summary(),
            tests_after: after.map(TestRun::summary),
            classifier,
        };
        let path = self.store.write_incident(&record)?;
        info!(status = ?status, path = %path.display(), "Incident report written");
        Ok(())
    }
}
