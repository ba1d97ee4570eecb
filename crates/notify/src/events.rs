//! Lifecycle event envelope delivered to the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version of the envelope wire format.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Version of the event payload contract.
pub const EVENT_VERSION: u32 = 1;

/// Constant `source` stamped on every envelope.
pub const EVENT_SOURCE: &str = "self-healing-systems";

/// Remediation attempt has started.
pub const HEAL_ATTEMPTED: &str = "heal.attempted";
/// Remediation finished and applied a patch.
pub const HEAL_COMPLETED: &str = "heal.completed";
/// Automated handling did not apply; a human must intervene.
pub const HEAL_ESCALATED: &str = "heal.escalated";

/// Severity levels for lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warn,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Wire name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event envelope.
///
/// The `id` doubles as the delivery idempotency key and is generated once per
/// logical event, so every retry of the same event carries the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: String,
    pub schema_version: String,
    pub event_version: u32,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    /// Build a new envelope with a fresh time-ordered identifier.
    #[must_use]
    pub fn new(
        correlation_id: &str,
        event_type: &str,
        severity: Severity,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: new_event_id(),
            schema_version: SCHEMA_VERSION.to_string(),
            event_version: EVENT_VERSION,
            source: EVENT_SOURCE.to_string(),
            event_type: event_type.to_string(),
            severity,
            timestamp: Utc::now(),
            correlation_id: correlation_id.to_string(),
            payload,
        }
    }
}

/// UUIDv7 keeps ids sortable by creation time.
fn new_event_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
