//! Sync status record persistence

use capstan_core::domain::object::ObjectKey;
use capstan_core::domain::sync::SyncStatus;
use capstan_core::error::StoreError;
use std::collections::BTreeMap;

use crate::repository::{KIND_SYNC_STATUS, SYSTEM_NAMESPACE, decode};
use crate::store::ObjectStore;

fn record_key(application: &str) -> ObjectKey {
    ObjectKey::new(KIND_SYNC_STATUS, SYSTEM_NAMESPACE, application)
}

/// Writes the current sync status of an application
pub async fn save(
    store: &dyn ObjectStore,
    status: &SyncStatus,
) -> Result<(), StoreError> {
    super::save_record(
        store,
        record_key(&status.application),
        BTreeMap::new(),
        status,
    )
    .await
}

/// Reads the persisted sync status of an application, if any
pub async fn find_by_application(
    store: &dyn ObjectStore,
    application: &str,
) -> Result<Option<SyncStatus>, StoreError> {
    match store.get(&record_key(application)).await {
        Ok(live) => Ok(Some(decode(&live)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes the sync status record; absence is success
pub async fn delete(
    store: &dyn ObjectStore,
    application: &str,
) -> Result<(), StoreError> {
    super::delete_record(store, &record_key(application)).await
}
