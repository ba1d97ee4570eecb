//! Lifecycle event delivery for the self-healing lab.
//!
//! This crate delivers structured lifecycle events (`heal.attempted`,
//! `heal.completed`, `heal.escalated`) to the mission-control hub with
//! bounded retries, jittered backoff and a per-event idempotency key.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{EventReporter, EventSink, Severity, HEAL_ATTEMPTED};
//!
//! # async fn run() -> Result<(), notify::ReporterError> {
//! let reporter = EventReporter::from_env()?;
//!
//! let mut payload = serde_json::Map::new();
//! payload.insert("status".to_string(), "started".into());
//!
//! let envelope = reporter
//!     .emit("corr-42", HEAL_ATTEMPTED, Severity::Info, payload)
//!     .await?;
//! println!("delivered {}", envelope.id);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! - `MISSION_CONTROL_URL`: hub base URL (events are posted to `<url>/events`)
//! - `MISSION_CONTROL_TOKEN`: bearer token sent on every delivery
//!
//! # Architecture
//!
//! - [`EventSink`] is the capability trait callers depend on
//! - [`EventReporter`] implements it over HTTP with a [`RetryPolicy`]
//! - [`EventEnvelope`] is built once per logical event and reused across retries

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod reporter;
pub mod sink;

pub use error::ReporterError;
pub use events::{EventEnvelope, Severity, HEAL_ATTEMPTED, HEAL_COMPLETED, HEAL_ESCALATED};
pub use reporter::{EventReporter, RetryPolicy};
pub use sink::EventSink;
