//! HTTP health probe.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Per-request timeout for a health check.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Source of truth for "is the service healthy right now".
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

/// Treats any 2xx from the health URL as healthy; everything else is not.
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!(url = %self.url, status = %response.status(), healthy, "Health check");
                healthy
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health check failed");
                false
            }
        }
    }
}
