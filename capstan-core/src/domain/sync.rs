//! Sync status domain types
//!
//! Per-application record of reconciliation progress. Mutated only by the
//! reconciler; read by the status reporter.

use serde::{Deserialize, Serialize};

use crate::domain::object::ObjectKey;
use crate::domain::snapshot::Fingerprint;

/// Health classification of an application's live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    /// Desired state applied and all workloads report ready
    Healthy,
    /// Objects still converging, or orphans remain with prune disabled
    Progressing,
    /// An apply exhausted its retries or a pass failed
    Degraded,
    /// No reconciliation has been attempted yet
    Unknown,
}

/// Phase of the per-application reconciliation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Diffing,
    Applying,
    /// Backing off after repeated optimistic-concurrency conflicts
    ConflictRetry,
    Settled,
    Failed,
}

/// What the reconciler did (or declined to do) with one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceAction {
    Created,
    Updated,
    Pruned,
    Unchanged,
    /// Orphaned live object left in place because prune is disabled
    PruneSkipped,
    Failed,
}

/// Per-object outcome of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub key: ObjectKey,
    pub action: ResourceAction,
    pub message: Option<String>,
}

impl ResourceOutcome {
    pub fn new(key: ObjectKey, action: ResourceAction) -> Self {
        Self {
            key,
            action,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Current sync record for one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub application: String,
    pub phase: SyncPhase,
    pub health: Health,
    /// Fingerprint of the last attempted reconciliation
    pub last_attempted: Option<Fingerprint>,
    /// Fingerprint of the last reconciliation that settled without failures
    pub last_synced: Option<Fingerprint>,
    pub resources: Vec<ResourceOutcome>,
    /// Terminal error of the last pass, if any; never silently dropped
    pub last_error: Option<String>,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl SyncStatus {
    /// Status for an application that has never been reconciled
    pub fn unknown(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            phase: SyncPhase::Idle,
            health: Health::Unknown,
            last_attempted: None,
            last_synced: None,
            resources: Vec::new(),
            last_error: None,
            observed_at: chrono::Utc::now(),
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Healthy => write!(f, "Healthy"),
            Health::Progressing => write!(f, "Progressing"),
            Health::Degraded => write!(f, "Degraded"),
            Health::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "Idle"),
            SyncPhase::Diffing => write!(f, "Diffing"),
            SyncPhase::Applying => write!(f, "Applying"),
            SyncPhase::ConflictRetry => write!(f, "ConflictRetry"),
            SyncPhase::Settled => write!(f, "Settled"),
            SyncPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl std::fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceAction::Created => write!(f, "Created"),
            ResourceAction::Updated => write!(f, "Updated"),
            ResourceAction::Pruned => write!(f, "Pruned"),
            ResourceAction::Unchanged => write!(f, "Unchanged"),
            ResourceAction::PruneSkipped => write!(f, "PruneSkipped"),
            ResourceAction::Failed => write!(f, "Failed"),
        }
    }
}
