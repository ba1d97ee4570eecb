//! Runtime watchdog with restart and rollback escalation.
//!
//! The watchdog polls a health endpoint and walks a small state machine:
//!
//! ```text
//! polling --(threshold consecutive failures)--> restarting
//! restarting --(healthy after cooldown)--> terminal: healed_after_restart
//! restarting --(no known-good image)--> terminal: rollback_unavailable
//! restarting --(unhealthy)--> rolled_back
//! rolled_back --(after cooldown)--> terminal: healed_after_rollback | failed_after_rollback
//! polling --(max cycles)--> terminal: no_action
//! ```
//!
//! Every run ends with exactly one runtime incident record.

pub mod compose;
pub mod probe;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;

pub use compose::{DockerCompose, ServiceRuntime};
pub use probe::{HealthProbe, HttpHealthProbe};

/// Watchdog tuning.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub health_url: String,
    /// Pause between health polls
    pub interval: Duration,
    /// Consecutive failures before a restart is issued
    pub threshold: u32,
    /// Pause after a recovery action before re-polling
    pub cooldown: Duration,
    /// Upper bound on polling cycles
    pub max_cycles: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            health_url: "http://localhost:8000/healthz".to_string(),
            interval: Duration::from_secs(5),
            threshold: 3,
            cooldown: Duration::from_secs(20),
            max_cycles: 20,
        }
    }
}

/// Recovery action issued against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Restart,
    Rollback,
}

/// Terminal status of one watchdog invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogStatus {
    Healed,
    HealedAfterRestart,
    HealedAfterRollback,
    FailedAfterRollback,
    RollbackUnavailable,
    NoAction,
}

impl WatchdogStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healed => "healed",
            Self::HealedAfterRestart => "healed_after_restart",
            Self::HealedAfterRollback => "healed_after_rollback",
            Self::FailedAfterRollback => "failed_after_rollback",
            Self::RollbackUnavailable => "rollback_unavailable",
            Self::NoAction => "no_action",
        }
    }

    #[must_use]
    pub const fn recovered(self) -> bool {
        matches!(
            self,
            Self::Healed | Self::HealedAfterRestart | Self::HealedAfterRollback
        )
    }
}

/// Thresholds the run was configured with.
#[derive(Debug, Clone, Serialize)]
pub struct Thresholds {
    pub consecutive_failure_threshold: u32,
    pub interval_seconds: f64,
    pub cooldown_seconds: f64,
    pub max_cycles: u32,
}

/// Runtime incident record written at the end of every run.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeIncidentRecord {
    pub timestamp: DateTime<Utc>,
    pub status: WatchdogStatus,
    pub health_url: String,
    pub actions: Vec<RecoveryAction>,
    pub recovered: bool,
    pub rollback_available: bool,
    pub thresholds: Thresholds,
}

impl RuntimeIncidentRecord {
    /// Process exit code: success only when the service recovered.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.recovered {
            0
        } else {
            1
        }
    }
}

/// Transient per-invocation state.
#[derive(Debug, Default)]
struct WatchdogState {
    consecutive_failures: u32,
    actions: Vec<RecoveryAction>,
}

/// Single-threaded health poller with bounded escalation.
pub struct Watchdog<P, R> {
    config: WatchdogConfig,
    probe: P,
    runtime: R,
    store: ArtifactStore,
}

impl<P: HealthProbe, R: ServiceRuntime> Watchdog<P, R> {
    #[must_use]
    pub fn new(config: WatchdogConfig, probe: P, runtime: R, store: ArtifactStore) -> Self {
        Self {
            config,
            probe,
            runtime,
            store,
        }
    }

    /// Run to a terminal status and persist the runtime incident record.
    pub async fn run(&self) -> RuntimeIncidentRecord {
        let mut state = WatchdogState::default();
        let status = self.poll(&mut state).await;

        let record = RuntimeIncidentRecord {
            timestamp: Utc::now(),
            status,
            health_url: self.config.health_url.clone(),
            recovered: status.recovered(),
            rollback_available: self.runtime.rollback_available().await,
            actions: state.actions,
            thresholds: Thresholds {
                consecutive_failure_threshold: self.config.threshold,
                interval_seconds: self.config.interval.as_secs_f64(),
                cooldown_seconds: self.config.cooldown.as_secs_f64(),
                max_cycles: self.config.max_cycles,
            },
        };

        match self.store.write_runtime_incident(&record) {
            Ok(path) => info!(
                status = ?record.status,
                path = %path.display(),
                "Runtime incident report written"
            ),
            Err(e) => error!(error = %e, "Failed to write runtime incident report"),
        }

        record
    }

    async fn poll(&self, state: &mut WatchdogState) -> WatchdogStatus {
        for cycle in 1..=self.config.max_cycles {
            if self.probe.is_healthy().await {
                state.consecutive_failures = 0;
                if !state.actions.is_empty() {
                    return WatchdogStatus::Healed;
                }
                tokio::time::sleep(self.config.interval).await;
                continue;
            }

            state.consecutive_failures += 1;
            warn!(
                cycle,
                consecutive_failures = state.consecutive_failures,
                threshold = self.config.threshold,
                "Health check failed"
            );
            if state.consecutive_failures < self.config.threshold {
                tokio::time::sleep(self.config.interval).await;
                continue;
            }

            return self.escalate(state).await;
        }

        info!(max_cycles = self.config.max_cycles, "Watchdog finished without action");
        WatchdogStatus::NoAction
    }

    /// Restart, then at most one rollback. Always terminal.
    async fn escalate(&self, state: &mut WatchdogState) -> WatchdogStatus {
        if let Err(e) = self.runtime.restart().await {
            warn!(error = %e, "Restart command failed");
        }
        state.actions.push(RecoveryAction::Restart);
        tokio::time::sleep(self.config.cooldown).await;

        if self.probe.is_healthy().await {
            info!("Service healthy after restart");
            return WatchdogStatus::HealedAfterRestart;
        }

        if !self.runtime.rollback_available().await {
            warn!("No known-good rollback target available");
            return WatchdogStatus::RollbackUnavailable;
        }

        if let Err(e) = self.runtime.rollback().await {
            warn!(error = %e, "Rollback command failed");
        }
        state.actions.push(RecoveryAction::Rollback);
        tokio::time::sleep(self.config.cooldown).await;

        if self.probe.is_healthy().await {
            info!("Service healthy after rollback");
            WatchdogStatus::HealedAfterRollback
        } else {
            error!("Service still unhealthy after rollback");
            WatchdogStatus::FailedAfterRollback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers from a script, then repeats `fallback`.
    struct ScriptedProbe {
        answers: Mutex<VecDeque<bool>>,
        fallback: bool,
        polls: Mutex<u32>,
    }

    impl ScriptedProbe {
        fn new(answers: &[bool], fallback: bool) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                fallback,
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for &ScriptedProbe {
        async fn is_healthy(&self) -> bool {
            *self.polls.lock().unwrap() += 1;
            self.answers.lock().unwrap().pop_front().unwrap_or(self.fallback)
        }
    }

    #[derive(Default)]
    struct FakeRuntime {
        has_good_image: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ServiceRuntime for &FakeRuntime {
        async fn restart(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("restart");
            Ok(())
        }

        async fn rollback(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("rollback");
            Ok(())
        }

        async fn rollback_available(&self) -> bool {
            self.has_good_image
        }
    }

    fn config(threshold: u32, max_cycles: u32) -> WatchdogConfig {
        WatchdogConfig {
            health_url: "http://app/healthz".to_string(),
            interval: Duration::from_secs(5),
            threshold,
            cooldown: Duration::from_secs(20),
            max_cycles,
        }
    }

    async fn run(
        cfg: WatchdogConfig,
        probe: &ScriptedProbe,
        runtime: &FakeRuntime,
        dir: &tempfile::TempDir,
    ) -> RuntimeIncidentRecord {
        Watchdog::new(cfg, probe, runtime, ArtifactStore::new(dir.path()))
            .run()
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_service_takes_no_action() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[], true);
        let runtime = FakeRuntime::default();

        let record = run(config(3, 4), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::NoAction);
        assert!(record.actions.is_empty());
        assert!(!record.recovered);
        assert_eq!(record.exit_code(), 1);
        assert_eq!(*probe.polls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_below_threshold_reset_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[false, false, true, false, false, true], true);
        let runtime = FakeRuntime::default();

        let record = run(config(3, 6), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::NoAction);
        assert!(runtime.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[false, false, false, true], true);
        let runtime = FakeRuntime::default();

        let record = run(config(3, 20), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::HealedAfterRestart);
        assert_eq!(record.actions, vec![RecoveryAction::Restart]);
        assert!(record.recovered);
        assert_eq!(record.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[], false);
        let runtime = FakeRuntime::default();

        let record = run(config(2, 20), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::RollbackUnavailable);
        assert_eq!(*runtime.calls.lock().unwrap(), vec!["restart"]);
        assert!(!record.rollback_available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_recovers() {
        let dir = tempfile::tempdir().unwrap();
        // two threshold failures, failed post-restart poll, healthy post-rollback poll
        let probe = ScriptedProbe::new(&[false, false, false, true], true);
        let runtime = FakeRuntime {
            has_good_image: true,
            ..FakeRuntime::default()
        };

        let record = run(config(2, 20), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::HealedAfterRollback);
        assert_eq!(
            record.actions,
            vec![RecoveryAction::Restart, RecoveryAction::Rollback]
        );
        assert!(record.recovered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_attempted_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[], false);
        let runtime = FakeRuntime {
            has_good_image: true,
            ..FakeRuntime::default()
        };

        let record = run(config(1, 20), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::FailedAfterRollback);
        assert_eq!(*runtime.calls.lock().unwrap(), vec!["restart", "rollback"]);
        assert_eq!(*probe.polls.lock().unwrap(), 3);
        assert_eq!(record.exit_code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cycles_still_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[], false);
        let runtime = FakeRuntime::default();

        let record = run(config(3, 0), &probe, &runtime, &dir).await;

        assert_eq!(record.status, WatchdogStatus::NoAction);
        let written = std::fs::read_to_string(
            dir.path().join(crate::artifacts::RUNTIME_INCIDENT_FILE),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["status"], "no_action");
        assert_eq!(value["health_url"], "http://app/healthz");
        assert_eq!(value["thresholds"]["consecutive_failure_threshold"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminates_within_max_cycles_for_any_script() {
        let scripts: [&[bool]; 4] = [&[true, false], &[false, true, false], &[false; 8], &[]];
        for script in scripts {
            for threshold in 0..4 {
                let dir = tempfile::tempdir().unwrap();
                let probe = ScriptedProbe::new(script, false);
                let runtime = FakeRuntime::default();

                let record = run(config(threshold, 5), &probe, &runtime, &dir).await;

                // max_cycles polls plus at most one post-restart poll
                assert!(*probe.polls.lock().unwrap() <= 6);
                assert!(record.actions.len() <= 2);
                assert!(dir.path().join(crate::artifacts::RUNTIME_INCIDENT_FILE).exists());
            }
        }
    }
}
