//! Recovery actions against a docker compose service.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Tag of the last known-good image.
pub const GOOD_TAG: &str = "good";

/// External recovery actions the watchdog can issue.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Restart the service in place.
    async fn restart(&self) -> Result<()>;

    /// Force-recreate the service from the known-good target.
    async fn rollback(&self) -> Result<()>;

    /// Whether a known-good rollback target exists.
    async fn rollback_available(&self) -> bool;
}

/// `docker compose` backed runtime.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    compose_file: PathBuf,
    service: String,
    image_base: String,
}

impl DockerCompose {
    #[must_use]
    pub fn new(compose_file: impl Into<PathBuf>, service: &str, image_base: &str) -> Self {
        Self {
            compose_file: compose_file.into(),
            service: service.to_string(),
            image_base: image_base.to_string(),
        }
    }

    /// Image reference rolled back to.
    #[must_use]
    pub fn good_image(&self) -> String {
        format!("{}:{GOOD_TAG}", self.image_base)
    }

    async fn compose(&self, args: &[&str], env: &[(&str, &str)]) -> Result<()> {
        let output = Command::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .await
            .context("Failed to execute docker compose")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("docker compose {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRuntime for DockerCompose {
    async fn restart(&self) -> Result<()> {
        info!(service = %self.service, "Restarting service");
        self.compose(&["restart", &self.service], &[]).await
    }

    async fn rollback(&self) -> Result<()> {
        info!(service = %self.service, image = %self.good_image(), "Rolling back service");
        self.compose(
            &["up", "-d", "--force-recreate", &self.service],
            &[("APP_IMAGE", &self.image_base), ("IMAGE_TAG", GOOD_TAG)],
        )
        .await
    }

    async fn rollback_available(&self) -> bool {
        let image = self.good_image();
        match Command::new("docker")
            .args(["image", "inspect", &image])
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!(image = %image, error = %e, "Failed to inspect rollback image");
                false
            }
        }
    }
}
