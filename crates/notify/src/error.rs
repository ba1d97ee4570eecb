//! Error types for event delivery.

use thiserror::Error;

/// Errors that can occur when delivering an event to the hub.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Hub answered with a 5xx status
    #[error("Server error from mission-control: {status}")]
    Server { status: u16 },

    /// Hub rejected the event with a non-retryable status
    #[error("Event rejected by mission-control: {status}")]
    Rejected { status: u16 },

    /// Every attempt failed
    #[error("Failed to report event after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ReporterError>,
    },
}

impl ReporterError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Server { .. })
    }
}
