//! Pipeline run DTOs for inter-service communication

use serde::{Deserialize, Serialize};

/// Request to submit a new build-and-push run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRun {
    pub source_ref: String,
    pub image_tag: String,
    /// Application to refresh once the run succeeds
    #[serde(default)]
    pub application: Option<String>,
}
