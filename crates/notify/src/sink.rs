//! Capability boundary for "deliver a lifecycle event".

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ReporterError;
use crate::events::{EventEnvelope, Severity};

/// Anything that can deliver a lifecycle event to the hub.
///
/// Callers hold an `Arc<dyn EventSink>` so tests can substitute a recording
/// double without touching process-wide state.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one logical event and return the envelope that was accepted.
    async fn emit(
        &self,
        correlation_id: &str,
        event_type: &str,
        severity: Severity,
        payload: Map<String, Value>,
    ) -> Result<EventEnvelope, ReporterError>;
}
