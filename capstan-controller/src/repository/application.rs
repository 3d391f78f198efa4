//! Application record persistence

use capstan_core::domain::application::Application;
use capstan_core::domain::object::ObjectKey;
use capstan_core::error::StoreError;
use std::collections::BTreeMap;

use crate::repository::{KIND_APPLICATION, SYSTEM_NAMESPACE, decode};
use crate::store::ObjectStore;

fn record_key(name: &str) -> ObjectKey {
    ObjectKey::new(KIND_APPLICATION, SYSTEM_NAMESPACE, name)
}

/// Creates or updates an application record
pub async fn save(
    store: &dyn ObjectStore,
    app: &Application,
) -> Result<(), StoreError> {
    super::save_record(store, record_key(&app.name), BTreeMap::new(), app).await
}

/// Finds an application by name
pub async fn find_by_name(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<Option<Application>, StoreError> {
    match store.get(&record_key(name)).await {
        Ok(live) => Ok(Some(decode(&live)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Lists every tracked application, sorted by name
pub async fn list(
    store: &dyn ObjectStore,
) -> Result<Vec<Application>, StoreError> {
    let records = store.list(SYSTEM_NAMESPACE, None).await?;
    let mut apps = Vec::new();
    for live in records
        .iter()
        .filter(|live| live.key.kind == KIND_APPLICATION)
    {
        apps.push(decode::<Application>(live)?);
    }
    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

/// Removes an application record; absence is success
pub async fn delete(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<(), StoreError> {
    super::delete_record(store, &record_key(name)).await
}
