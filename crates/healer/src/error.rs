//! Error types for the healer.

use std::path::PathBuf;
use thiserror::Error;

/// Bad input to the demo compute endpoint. User-correctable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("numerator and denominator must be numbers")]
    MissingOperand,

    #[error("denominator must be non-zero")]
    ZeroDenominator,
}

/// Missing or invalid credential on a protected route. Fails closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("heal token is not configured")]
    NotConfigured,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,
}

/// A remediation attempt could not be completed. Not retried.
#[derive(Debug, Error)]
pub enum RemediationError {
    /// The insertion anchor has drifted out of the artifact
    #[error("anchor not found while restoring guard in {path}: {anchor:?}")]
    AnchorNotFound { path: PathBuf, anchor: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remediation cancelled")]
    Cancelled,
}

/// Bug injection could not be applied.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("{0} bug is already injected or marker not found")]
    GuardMissing(String),

    #[error("unsupported injection mode: {0}")]
    Unsupported(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure writing a persisted artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize incident: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller-visible failure of a heal request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The attempt announcement could not be delivered
    #[error("reporting failed: {0}")]
    Reporting(#[from] notify::ReporterError),
}
