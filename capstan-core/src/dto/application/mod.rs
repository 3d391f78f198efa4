//! Application DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::application::SyncPolicy;

/// Request to register a new application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub repo_url: String,
    #[serde(default)]
    pub path: String,
    pub target_revision: String,
    pub dest_namespace: String,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
}
