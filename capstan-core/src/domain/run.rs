//! Pipeline run domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One build-and-push attempt.
///
/// Created Pending by the pipeline trigger; transitions exactly once to
/// Succeeded or Failed and is never mutated afterward. History is
/// append-only per application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    /// Source reference handed to the build step (branch, tag or commit)
    pub source_ref: String,
    /// Image tag the build pushes to
    pub image_tag: String,
    /// Application to refresh once the run succeeds, if any
    pub application: Option<String>,
    pub outcome: RunOutcome,
    /// Digest of the pushed image; present exactly when Succeeded
    pub image_digest: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Pending,
    Succeeded,
    Failed,
}

impl PipelineRun {
    /// Creates a new pending run
    pub fn pending(
        source_ref: impl Into<String>,
        image_tag: impl Into<String>,
        application: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_ref: source_ref.into(),
            image_tag: image_tag.into(),
            application,
            outcome: RunOutcome::Pending,
            image_digest: None,
            error_message: None,
            submitted_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    /// Whether the run has reached a terminal outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded | RunOutcome::Failed)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Pending => write!(f, "Pending"),
            RunOutcome::Succeeded => write!(f, "Succeeded"),
            RunOutcome::Failed => write!(f, "Failed"),
        }
    }
}
