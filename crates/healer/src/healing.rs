//! Payload-driven healing: extract failure text, classify, remediate.

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::classifier::classify;
use crate::error::RemediationError;
use crate::remediation::{is_remediable, RemediationEngine};
use crate::types::{HealOutcome, REASON_UNKNOWN_SIGNATURE};

/// Lines of failure output included in an escalation preview.
pub const PREVIEW_LINES: usize = 100;

/// Payload fields searched for failure text, highest priority first.
const OUTPUT_FIELDS: &[&str] = &["output", "failingOutput", "pytestOutput", "logs"];

/// Runs one remediation for a webhook payload.
///
/// Implementations run on a blocking worker and should check `cancel`
/// between steps.
pub trait Healer: Send + Sync + 'static {
    fn heal(
        &self,
        payload: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<HealOutcome, RemediationError>;
}

/// Heals using the classifier and the remediation engine.
#[derive(Debug, Clone)]
pub struct PatchHealer {
    engine: RemediationEngine,
}

impl PatchHealer {
    #[must_use]
    pub fn new(engine: RemediationEngine) -> Self {
        Self { engine }
    }
}

impl Healer for PatchHealer {
    fn heal(
        &self,
        payload: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<HealOutcome, RemediationError> {
        let output = extract_failure_output(payload);
        let diagnosis = classify(output);

        if !is_remediable(diagnosis.kind) {
            info!(kind = %diagnosis.kind, "Unknown failure signature, escalating");
            let preview: Vec<Value> = output
                .lines()
                .take(PREVIEW_LINES)
                .map(|line| Value::String(line.to_string()))
                .collect();

            let mut context = Map::new();
            context.insert(
                "summary".to_string(),
                json!(diagnosis.message.unwrap_or_default()),
            );
            context.insert("failingOutputPreview".to_string(), Value::Array(preview));
            context.insert(
                "candidateFiles".to_string(),
                json!(self.engine.candidate_files()),
            );
            return Ok(HealOutcome::escalated(REASON_UNKNOWN_SIGNATURE, context));
        }

        let changed = self.engine.apply_fix(&diagnosis, cancel)?;
        Ok(HealOutcome::completed(
            format!("Applied {} remediation.", diagnosis.kind),
            changed,
        ))
    }
}

/// First non-blank string among the known payload fields, else `""`.
#[must_use]
pub fn extract_failure_output(payload: &Map<String, Value>) -> &str {
    let nested = payload
        .get("build")
        .and_then(Value::as_object)
        .and_then(|build| build.get("output"));

    OUTPUT_FIELDS
        .iter()
        .map(|field| payload.get(*field))
        .chain(std::iter::once(nested))
        .flatten()
        .filter_map(Value::as_str)
        .find(|text| !text.trim().is_empty())
        .unwrap_or("")
}
