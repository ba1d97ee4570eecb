//! Self-healing lab CLI
//!
//! Serves the demo service and heal webhook, runs the offline heal loop,
//! watches runtime health and injects known bugs for demos.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use healer::artifacts::{ArtifactStore, INCIDENT_FILE};
use healer::health::HealthState;
use healer::injector::{inject_bug, InjectMode};
use healer::runner::{CommandVerifier, IncidentStatus, OfflineRunner, DEFAULT_VERIFY_COMMAND};
use healer::server::{run_server, AppState};
use healer::watchdog::{DockerCompose, HttpHealthProbe, Watchdog, WatchdogConfig};
use healer::{HealOrchestrator, PatchHealer, RemediationEngine};
use notify::EventReporter;

/// Self-healing lab - classifies failures, applies fixes and watches runtime health
#[derive(Parser)]
#[command(name = "healer")]
#[command(about = "Self-healing lab - classifies failures, applies fixes and watches runtime health")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo service and the authenticated /heal webhook
    Serve {
        /// Address to bind
        #[arg(long, env = "HEALER_BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,

        /// Bearer secret required on /heal (unset rejects every heal request)
        #[arg(long, env = "SELF_HEALER_TOKEN", hide_env_values = true)]
        heal_token: Option<String>,

        /// Wall-clock budget for one remediation, in seconds
        #[arg(long, env = "HEALER_EXECUTION_TIMEOUT_SECONDS", default_value = "300", value_parser = parse_seconds)]
        execution_timeout_secs: Duration,

        /// Root of the target project whose artifacts are patched
        #[arg(long, env = "HEALER_TARGET_ROOT", default_value = ".")]
        target_root: PathBuf,

        #[command(flatten)]
        hub: HubArgs,
    },
    /// Verify, classify, remediate and re-verify once; exit 0 only when healed
    Run {
        /// Root of the target project
        #[arg(long, default_value = ".")]
        target_root: PathBuf,

        /// Artifact directory (defaults to <target-root>/artifacts)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Verification command, run from the target root
        #[arg(long, default_value = DEFAULT_VERIFY_COMMAND)]
        verify_command: String,
    },
    /// Poll a health endpoint and restart or roll back the service
    Watchdog {
        /// Health endpoint to poll
        #[arg(long, default_value = "http://localhost:8000/healthz")]
        health_url: String,

        /// Compose file managing the service
        #[arg(long, default_value = "docker-compose.yml")]
        compose_file: PathBuf,

        /// Compose service name
        #[arg(long, default_value = "app")]
        service: String,

        /// Seconds between polls
        #[arg(long, default_value = "5", value_parser = parse_seconds)]
        interval: Duration,

        /// Consecutive failures before a restart
        #[arg(long, default_value = "3")]
        threshold: u32,

        /// Seconds to wait after a recovery action
        #[arg(long, default_value = "20", value_parser = parse_seconds)]
        cooldown: Duration,

        /// Image repository; rollback uses its `good` tag
        #[arg(long, default_value = "self-healing-lab/app")]
        image_base: String,

        /// Maximum polling cycles
        #[arg(long, default_value = "20")]
        max_cycles: u32,

        /// Artifact directory for the runtime incident report
        #[arg(long, default_value = "artifacts")]
        artifacts_dir: PathBuf,
    },
    /// Remove a guard from the target logic to reproduce a known failure
    Inject {
        /// Bug to inject
        #[arg(long, value_enum)]
        mode: InjectMode,

        /// Root of the target project
        #[arg(long, default_value = ".")]
        target_root: PathBuf,
    },
}

/// Mission-control hub settings.
#[derive(clap::Args, Debug)]
struct HubArgs {
    /// Hub base URL; events are posted to <url>/events
    #[arg(long, env = "MISSION_CONTROL_URL", default_value = notify::reporter::DEFAULT_HUB_URL)]
    hub_url: String,

    /// Bearer token for the hub
    #[arg(long, env = "MISSION_CONTROL_TOKEN", default_value = "", hide_env_values = true)]
    hub_token: String,

    /// Per-request timeout, in seconds
    #[arg(long, env = "MISSION_CONTROL_TIMEOUT_SECONDS", default_value = "5", value_parser = parse_seconds)]
    hub_timeout_secs: Duration,

    /// Delivery attempts per event
    #[arg(long, default_value = "3")]
    hub_max_attempts: u32,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("invalid number of seconds '{value}': {e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{value}': {e}"))
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("healer=info,notify=info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Serve {
            bind,
            heal_token,
            execution_timeout_secs,
            target_root,
            hub,
        } => {
            serve(bind, heal_token, execution_timeout_secs, target_root, hub).await?;
        }
        Commands::Run {
            target_root,
            artifacts_dir,
            verify_command,
        } => {
            let code = run_offline(target_root, artifacts_dir, &verify_command).await?;
            std::process::exit(code);
        }
        Commands::Watchdog {
            health_url,
            compose_file,
            service,
            interval,
            threshold,
            cooldown,
            image_base,
            max_cycles,
            artifacts_dir,
        } => {
            let config = WatchdogConfig {
                health_url,
                interval,
                threshold,
                cooldown,
                max_cycles,
            };
            let runtime = DockerCompose::new(compose_file, &service, &image_base);
            let code = run_watchdog(config, runtime, artifacts_dir).await?;
            std::process::exit(code);
        }
        Commands::Inject { mode, target_root } => {
            let engine = RemediationEngine::new(target_root);
            let path = inject_bug(&engine, mode)
                .with_context(|| format!("Failed to inject {} bug", mode.as_str()))?;
            println!(
                "{} Injected {} bug into {}",
                "✓".green(),
                mode.as_str().bold(),
                path.display()
            );
        }
    }

    Ok(())
}

async fn serve(
    bind: String,
    heal_token: Option<String>,
    execution_timeout: Duration,
    target_root: PathBuf,
    hub: HubArgs,
) -> Result<()> {
    let reporter = EventReporter::new(&hub.hub_url, &hub.hub_token, hub.hub_timeout_secs)
        .context("Failed to build hub client")?
        .with_max_attempts(hub.hub_max_attempts);

    if heal_token.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("SELF_HEALER_TOKEN is not set; every /heal request will be rejected");
    }

    let healer = PatchHealer::new(RemediationEngine::new(target_root));
    let orchestrator =
        HealOrchestrator::new(Arc::new(reporter), Arc::new(healer)).with_timeout(execution_timeout);

    let state = Arc::new(AppState {
        health: Arc::new(HealthState::new()),
        orchestrator,
        heal_token,
    });

    run_server(state, &bind).await
}

async fn run_offline(
    target_root: PathBuf,
    artifacts_dir: Option<PathBuf>,
    verify_command: &str,
) -> Result<i32> {
    let artifacts_dir = artifacts_dir.unwrap_or_else(|| target_root.join("artifacts"));
    let verifier = CommandVerifier::parse(verify_command, &target_root)?;
    let store = ArtifactStore::new(artifacts_dir);
    let runner = OfflineRunner::new(verifier, RemediationEngine::new(target_root), store.clone());

    let status = runner.run().await;
    let label = match status {
        IncidentStatus::Healed => "healed".green().bold(),
        IncidentStatus::Noop => "noop".yellow().bold(),
        IncidentStatus::Failed => "failed".red().bold(),
    };
    println!("Heal run: {label}");
    println!("Incident report: {}", store.path(INCIDENT_FILE).display());

    Ok(status.exit_code())
}

async fn run_watchdog(
    config: WatchdogConfig,
    runtime: DockerCompose,
    artifacts_dir: PathBuf,
) -> Result<i32> {
    let probe = HttpHealthProbe::new(&config.health_url).context("Failed to build health probe")?;
    let watchdog = Watchdog::new(config, probe, runtime, ArtifactStore::new(artifacts_dir));

    let record = watchdog.run().await;
    let status = record.status.as_str();
    if record.recovered {
        println!("Watchdog: {}", status.green().bold());
    } else {
        println!("Watchdog: {}", status.red().bold());
    }

    Ok(record.exit_code())
}
