//! In-process health state for the demo service.

use std::sync::atomic::{AtomicBool, Ordering};

/// Health as seen by the probe routes.
pub trait HealthSource: Send + Sync {
    fn is_healthy(&self) -> bool;

    /// Force or clear a simulated unhealthy state.
    fn set_simulated_unhealthy(&self, unhealthy: bool);
}

/// Simulated health flag toggled through the `/__simulate/*` routes.
#[derive(Debug, Default)]
pub struct HealthState {
    forced_unhealthy: AtomicBool,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HealthSource for HealthState {
    fn is_healthy(&self) -> bool {
        !self.forced_unhealthy.load(Ordering::SeqCst)
    }

    fn set_simulated_unhealthy(&self, unhealthy: bool) {
        self.forced_unhealthy.store(unhealthy, Ordering::SeqCst);
    }
}
