//! Self-healing lab.
//!
//! Detects failures in a small target service and repairs them without a
//! human in the loop:
//!
//! - [`classifier`] maps raw test output to a [`types::Diagnosis`]
//! - [`remediation`] restores guard clauses and regression tests in the target
//! - [`orchestrator`] serves authenticated heal requests under a timeout and
//!   reports lifecycle events through [`notify`]
//! - [`runner`] is the offline verify/heal/re-verify loop
//! - [`watchdog`] restarts or rolls back an unhealthy runtime service
//! - [`server`] exposes the demo service and the heal webhook over HTTP

pub mod artifacts;
pub mod auth;
pub mod classifier;
pub mod compute;
pub mod error;
pub mod healing;
pub mod health;
pub mod injector;
pub mod orchestrator;
pub mod remediation;
pub mod runner;
pub mod server;
pub mod types;
pub mod watchdog;

pub use classifier::classify;
pub use healing::{Healer, PatchHealer};
pub use orchestrator::HealOrchestrator;
pub use remediation::RemediationEngine;
pub use types::{Diagnosis, FailureKind, HealOutcome, HealStatus};
