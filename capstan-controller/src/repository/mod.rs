//! Control-plane record persistence
//!
//! Applications, sync statuses and pipeline runs persist as objects in the
//! store itself, under a reserved namespace. No separate database: the
//! same optimistic-concurrency rules that guard live objects guard the
//! control records, and a store backend that survives restarts makes the
//! controller durable for free.

pub mod application;
pub mod run;
pub mod status;

use capstan_core::domain::object::{LiveObject, ManifestObject, ObjectKey};
use capstan_core::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

use crate::store::ObjectStore;

/// Namespace holding the controller's own records
pub const SYSTEM_NAMESPACE: &str = "capstan-system";

pub const KIND_APPLICATION: &str = "Application";
pub const KIND_SYNC_STATUS: &str = "SyncStatus";
pub const KIND_PIPELINE_RUN: &str = "PipelineRun";

/// Attempts per save before giving a conflict back to the caller
const SAVE_ATTEMPTS: u32 = 3;

/// Decodes a stored record back into its domain type
fn decode<T: DeserializeOwned>(live: &LiveObject) -> Result<T, StoreError> {
    serde_json::from_value(live.spec.clone()).map_err(|e| {
        StoreError::Validation(format!("corrupt {} record: {e}", live.key.kind))
    })
}

/// Create-or-update with a short conflict-retry loop.
///
/// Record writers are few (one worker per application, one task per run),
/// so conflicts here mean a racing writer and re-reading almost always
/// resolves them on the first retry.
async fn save_record<T: Serialize>(
    store: &dyn ObjectStore,
    key: ObjectKey,
    labels: BTreeMap<String, String>,
    record: &T,
) -> Result<(), StoreError> {
    let spec = serde_json::to_value(record).map_err(|e| {
        StoreError::Validation(format!("unencodable {} record: {e}", key.kind))
    })?;
    let manifest = ManifestObject {
        key: key.clone(),
        labels,
        spec,
    };

    let mut attempt = 0;
    loop {
        let expected = match store.get(&key).await {
            Ok(live) => Some(live.resource_version),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        match store.apply(manifest.clone(), expected).await {
            Ok(_) => return Ok(()),
            Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deletes a record if present; absence is success
async fn delete_record(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<(), StoreError> {
    let mut attempt = 0;
    loop {
        let live = match store.get(key).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        match store.delete(key, live.resource_version).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
