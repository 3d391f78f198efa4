//! Status report DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::application::Application;
use crate::domain::run::PipelineRun;
use crate::domain::sync::SyncStatus;

/// Aggregated view of one application: definition, sync record and the
/// latest pipeline run. Pure projection; produced by the status reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub application: Application,
    pub sync: SyncStatus,
    pub latest_run: Option<PipelineRun>,
}
