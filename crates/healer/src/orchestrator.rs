//! Timeout-bounded heal orchestration with lifecycle reporting.
//!
//! Flow for one request:
//! 1. announce `heal.attempted` (a delivery failure here is returned to the caller)
//! 2. run the [`Healer`] on a blocking worker, raced against the execution timeout
//! 3. announce `heal.completed` or `heal.escalated` and return the outcome
//!
//! On timeout the remediation's cancellation token is tripped, but work that
//! is already writing an artifact may still finish after the response.

use std::sync::Arc;
use std::time::Duration;

use notify::{EventSink, Severity, HEAL_ATTEMPTED, HEAL_COMPLETED, HEAL_ESCALATED};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::OrchestratorError;
use crate::healing::Healer;
use crate::types::{HealOutcome, REASON_REMEDIATION_FAILED, REASON_TIMEOUT, REASON_UNKNOWN_SIGNATURE};

/// Default wall-clock budget for one remediation.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Online entry point for heal requests.
pub struct HealOrchestrator {
    sink: Arc<dyn EventSink>,
    healer: Arc<dyn Healer>,
    timeout: Duration,
}

impl HealOrchestrator {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, healer: Arc<dyn Healer>) -> Self {
        Self {
            sink,
            healer,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Handle one authenticated heal request.
    pub async fn heal(
        &self,
        correlation_id: &str,
        payload: Map<String, Value>,
    ) -> Result<HealOutcome, OrchestratorError> {
        let mut started = Map::new();
        started.insert("status".to_string(), json!("started"));
        self.sink
            .emit(correlation_id, HEAL_ATTEMPTED, Severity::Info, started)
            .await?;

        let outcome = self.run_bounded(correlation_id, payload).await;
        self.announce(correlation_id, &outcome).await;
        Ok(outcome)
    }

    async fn run_bounded(&self, correlation_id: &str, payload: Map<String, Value>) -> HealOutcome {
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let healer = Arc::clone(&self.healer);
        let task = tokio::task::spawn_blocking(move || healer.heal(&payload, &worker_cancel));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                error!(correlation_id, error = %e, "Remediation failed");
                remediation_failed(&e.to_string())
            }
            Ok(Err(join_error)) => {
                error!(correlation_id, error = %join_error, "Remediation worker aborted");
                remediation_failed(&join_error.to_string())
            }
            Err(_elapsed) => {
                cancel.cancel();
                warn!(
                    correlation_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Remediation exceeded execution timeout"
                );
                let mut context = Map::new();
                context.insert(
                    "summary".to_string(),
                    json!(format!(
                        "Healer execution exceeded {}s timeout.",
                        self.timeout.as_secs_f64()
                    )),
                );
                context.insert("timeoutSeconds".to_string(), json!(self.timeout.as_secs_f64()));
                HealOutcome::escalated(REASON_TIMEOUT, context)
            }
        }
    }

    /// Announce the terminal event. Failures are logged, never hide the outcome.
    async fn announce(&self, correlation_id: &str, outcome: &HealOutcome) {
        let (event_type, severity, payload) = if outcome.is_completed() {
            let mut payload = Map::new();
            payload.insert("patchSummary".to_string(), json!(outcome.patch_summary));
            payload.insert("changedFiles".to_string(), json!(outcome.changed_files));
            (HEAL_COMPLETED, Severity::Info, payload)
        } else {
            let mut payload = Map::new();
            payload.insert("reasonCode".to_string(), json!(outcome.reason_code));
            payload.insert("humanContext".to_string(), json!(outcome.human_context));
            let severity = escalation_severity(outcome.reason_code.as_deref());
            (HEAL_ESCALATED, severity, payload)
        };

        match self.sink.emit(correlation_id, event_type, severity, payload).await {
            Ok(envelope) => info!(
                correlation_id,
                event_type,
                event_id = %envelope.id,
                "Heal outcome reported"
            ),
            Err(e) => error!(
                correlation_id,
                event_type,
                error = %e,
                "Failed to report heal outcome"
            ),
        }
    }
}

fn escalation_severity(reason_code: Option<&str>) -> Severity {
    match reason_code {
        Some(REASON_UNKNOWN_SIGNATURE) => Severity::Warn,
        _ => Severity::Critical,
    }
}

fn remediation_failed(message: &str) -> HealOutcome {
    let mut context = Map::new();
    context.insert("summary".to_string(), json!(message));
    HealOutcome::escalated(REASON_REMEDIATION_FAILED, context)
}
