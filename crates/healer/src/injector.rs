//! Deterministic bug injection for exercising the healer.
//!
//! Removes a kind's guard block from the logic artifact, the exact inverse of
//! what the remediation engine restores.

use std::path::PathBuf;

use tracing::info;

use crate::error::InjectError;
use crate::remediation::{descriptor_for, RemediationEngine};
use crate::types::FailureKind;

/// Which guard to strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InjectMode {
    ZeroDivision,
    NoneType,
}

impl InjectMode {
    #[must_use]
    pub const fn kind(self) -> FailureKind {
        match self {
            Self::ZeroDivision => FailureKind::ZeroDivision,
            Self::NoneType => FailureKind::NoneTypeError,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZeroDivision => "zero_division",
            Self::NoneType => "none_type",
        }
    }
}

/// Strip the guard for `mode` from the engine's logic artifact.
///
/// Returns the path that was modified.
pub fn inject_bug(engine: &RemediationEngine, mode: InjectMode) -> Result<PathBuf, InjectError> {
    let patch = descriptor_for(mode.kind())
        .ok_or_else(|| InjectError::Unsupported(mode.as_str().to_string()))?;

    let path = engine.resolve(engine.logic_file());
    let source = std::fs::read_to_string(&path).map_err(|source| InjectError::Io {
        path: path.clone(),
        source,
    })?;

    if !source.contains(patch.guard) {
        return Err(InjectError::GuardMissing(mode.as_str().to_string()));
    }

    std::fs::write(&path, source.replace(patch.guard, "")).map_err(|source| InjectError::Io {
        path: path.clone(),
        source,
    })?;

    info!(mode = mode.as_str(), path = %path.display(), "Injected bug");
    Ok(path)
}
