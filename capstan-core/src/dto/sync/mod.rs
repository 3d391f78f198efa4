//! Sync DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::snapshot::Fingerprint;
use crate::domain::sync::{Health, ResourceOutcome, SyncPhase};

/// Request to reconcile an application now
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Overrides the application's prune policy for this pass only
    #[serde(default)]
    pub prune: Option<bool>,
    /// Compute and report planned actions without touching live objects
    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of one requested reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub application: String,
    pub fingerprint: Option<Fingerprint>,
    pub phase: SyncPhase,
    pub health: Health,
    pub resources: Vec<ResourceOutcome>,
    /// Terminal error kind and message when the pass did not settle cleanly
    pub message: Option<String>,
    pub dry_run: bool,
}

impl SyncReport {
    /// Whether the pass converged without failures.
    ///
    /// Degraded (retries exhausted) and Failed (pass aborted) both count as
    /// sync failure for the caller's exit code.
    pub fn succeeded(&self) -> bool {
        self.phase != SyncPhase::Failed && self.health != Health::Degraded
    }
}
