//! HTTP event reporter for the mission-control hub.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ReporterError;
use crate::events::{EventEnvelope, Severity};
use crate::sink::EventSink;

/// Environment variable for the hub base URL.
const ENV_HUB_URL: &str = "MISSION_CONTROL_URL";
/// Environment variable for the hub bearer token.
const ENV_HUB_TOKEN: &str = "MISSION_CONTROL_TOKEN";

/// Default hub base URL when none is configured.
pub const DEFAULT_HUB_URL: &str = "http://mission-control:3000";

/// Header carrying the event id on every delivery attempt.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of delivery attempts per event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry behaviour for a single `emit`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Base delay before attempt `n + 1`, indexed by `min(n, len - 1)`
    pub backoff: Vec<Duration>,
    /// Multiplicative jitter range applied to each base delay
    pub jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
            jitter: (0.8, 1.2),
        }
    }
}

impl RetryPolicy {
    /// Base delay after the given zero-based failed attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }

    /// Jittered delay after the given zero-based failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let (low, high) = self.jitter;
        if base.is_zero() || low >= high {
            return base;
        }
        base.mul_f64(rand::rng().random_range(low..=high))
    }
}

impl RetryPolicy {
    /// Drive `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the number of attempts used.
    ///
    /// `op` receives the one-based attempt number. Sleeps only between attempts.
    pub async fn run<F, Fut>(&self, mut op: F) -> Result<u32, ReporterError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), ReporterError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match op(attempt + 1).await {
                Ok(()) => return Ok(attempt + 1),
                Err(e) if !e.is_retryable() => {
                    warn!(error = %e, "Event rejected, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Event delivery failed"
                    );
                    last_error = Some(e);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.delay(attempt)).await;
                    }
                }
            }
        }

        Err(ReporterError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or(ReporterError::Server { status: 0 })),
        })
    }
}

/// Delivers lifecycle events to `<base_url>/events`.
pub struct EventReporter {
    base_url: String,
    token: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl EventReporter {
    /// Create a reporter for the given hub.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ReporterError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            policy: RetryPolicy::default(),
            client,
        })
    }

    /// Create a reporter from environment variables.
    pub fn from_env() -> Result<Self, ReporterError> {
        let base_url = std::env::var(ENV_HUB_URL).unwrap_or_else(|_| DEFAULT_HUB_URL.to_string());
        let token = std::env::var(ENV_HUB_TOKEN).unwrap_or_default();

        if token.is_empty() {
            warn!("{ENV_HUB_TOKEN} not set, hub deliveries will be unauthenticated");
        }

        Self::new(&base_url, &token, DEFAULT_TIMEOUT)
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the attempt budget, keeping the backoff schedule.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Base URL of the hub.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    /// Deliver an already-built envelope, retrying transient failures.
    ///
    /// The same envelope and idempotency key are sent on every attempt.
    pub async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), ReporterError> {
        let url = &self.events_url();
        let attempts = self
            .policy
            .run(|attempt| {
                debug!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    attempt,
                    "Delivering event"
                );
                self.post_once(url, envelope)
            })
            .await?;

        info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            correlation_id = %envelope.correlation_id,
            attempts,
            "Event delivered"
        );
        Ok(())
    }

    async fn post_once(&self, url: &str, envelope: &EventEnvelope) -> Result<(), ReporterError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(IDEMPOTENCY_HEADER, &envelope.id)
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ReporterError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ReporterError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for EventReporter {
    async fn emit(
        &self,
        correlation_id: &str,
        event_type: &str,
        severity: Severity,
        payload: Map<String, Value>,
    ) -> Result<EventEnvelope, ReporterError> {
        let envelope = EventEnvelope::new(correlation_id, event_type, severity, payload);
        self.deliver(&envelope).await?;
        Ok(envelope)
    }
}
