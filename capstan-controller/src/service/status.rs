//! Status Service
//!
//! Aggregated per-application view: definition, sync record and latest
//! pipeline run. Pure reads; nothing here mutates state.

use capstan_core::domain::sync::SyncStatus;
use capstan_core::dto::status::StatusReport;
use capstan_core::error::StoreError;

use crate::repository;
use crate::store::ObjectStore;

/// Service error type
#[derive(Debug)]
pub enum StatusError {
    NotFound(String),
    StoreError(StoreError),
}

impl From<StoreError> for StatusError {
    fn from(err: StoreError) -> Self {
        StatusError::StoreError(err)
    }
}

pub type Result<T> = std::result::Result<T, StatusError>;

/// Build the status report for one application.
///
/// Only an unknown application fails. A missing or unreadable sync record
/// degrades to the Unknown status and run-history read errors drop the
/// latest run, so a damaged record never hides the application itself.
pub async fn get_status(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<StatusReport> {
    let application = repository::application::find_by_name(store, name)
        .await?
        .ok_or_else(|| StatusError::NotFound(name.to_string()))?;

    let sync = match repository::status::find_by_application(store, name).await
    {
        Ok(Some(status)) => status,
        Ok(None) => SyncStatus::unknown(name),
        Err(e) => {
            tracing::warn!("Sync status for {} unreadable: {}", name, e);
            SyncStatus::unknown(name)
        }
    };

    let latest_run = match repository::run::list(store, Some(name)).await {
        Ok(mut runs) => runs.pop(),
        Err(e) => {
            tracing::warn!("Run history for {} unreadable: {}", name, e);
            None
        }
    };

    Ok(StatusReport {
        application,
        sync,
        latest_run,
    })
}
