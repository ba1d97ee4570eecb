//! Shared types for failure diagnosis and heal outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of failure signatures the classifier recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Division by zero
    ZeroDivision,
    /// Arithmetic on a missing (`None`) value
    NoneTypeError,
    /// Plain assertion failure, never remediated automatically
    AssertionFailure,
    /// No known signature matched
    Unknown,
}

impl FailureKind {
    /// Wire name used in incident records and patch summaries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroDivision => "ZERO_DIVISION",
            Self::NoneTypeError => "NONE_TYPE_ERROR",
            Self::AssertionFailure => "ASSERTION_FAILURE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of classifying raw failure text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(rename = "failure_type")]
    pub kind: FailureKind,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: Option<String>,
}

impl Diagnosis {
    /// Diagnosis with only a kind, as used by tests and the injector.
    #[must_use]
    pub const fn of(kind: FailureKind) -> Self {
        Self {
            kind,
            file: None,
            line: None,
            message: None,
        }
    }
}

/// Terminal status of a heal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealStatus {
    Completed,
    Escalated,
}

/// Escalation reason: no known signature matched.
pub const REASON_UNKNOWN_SIGNATURE: &str = "unknown_failure_signature";
/// Escalation reason: remediation exceeded the execution timeout.
pub const REASON_TIMEOUT: &str = "healer_timeout";
/// Escalation reason: remediation itself failed.
pub const REASON_REMEDIATION_FAILED: &str = "remediation_failed";

/// Result of one heal request.
///
/// Build through [`HealOutcome::completed`] or [`HealOutcome::escalated`] so a
/// completed outcome never carries escalation context and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealOutcome {
    pub status: HealStatus,
    pub reason_code: Option<String>,
    pub human_context: Option<Map<String, Value>>,
    pub patch_summary: Option<String>,
    pub changed_files: Vec<String>,
}

impl HealOutcome {
    /// A remediation was applied.
    #[must_use]
    pub fn completed(patch_summary: String, changed_files: Vec<String>) -> Self {
        Self {
            status: HealStatus::Completed,
            reason_code: None,
            human_context: None,
            patch_summary: Some(patch_summary),
            changed_files,
        }
    }

    /// Automated handling did not apply.
    #[must_use]
    pub fn escalated(reason_code: &str, human_context: Map<String, Value>) -> Self {
        Self {
            status: HealStatus::Escalated,
            reason_code: Some(reason_code.to_string()),
            human_context: Some(human_context),
            patch_summary: None,
            changed_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == HealStatus::Completed
    }
}
