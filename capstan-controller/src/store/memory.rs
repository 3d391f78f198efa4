//! In-memory object store
//!
//! Single-process backend holding live objects in an RwLock'd map with a
//! store-wide monotonic version counter. Watch events fan out over a
//! bounded broadcast channel.

use async_trait::async_trait;
use capstan_core::domain::object::{LiveObject, ManifestObject, ObjectKey};
use capstan_core::error::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::store::{ObjectStore, WatchEvent, WatchSubscription};

/// Watch fan-out buffer per store; lagged subscribers see Overflowed
const WATCH_BUFFER: usize = 256;

/// In-memory, Kubernetes-shaped object store
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectKey, LiveObject>>,
    version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            objects: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            events,
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, event: WatchEvent) {
        // send only fails when nobody subscribes, which is fine
        let _ = self.events.send(event);
    }

    fn validate(manifest: &ManifestObject) -> Result<(), StoreError> {
        if manifest.key.kind.is_empty() {
            return Err(StoreError::Validation(
                "object kind cannot be empty".to_string(),
            ));
        }
        if manifest.key.name.is_empty() {
            return Err(StoreError::Validation(
                "object name cannot be empty".to_string(),
            ));
        }
        if manifest.key.namespace.is_empty() {
            return Err(StoreError::Validation(format!(
                "object {}/{} has no namespace",
                manifest.key.kind, manifest.key.name
            )));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<LiveObject, StoreError> {
        let objects = self.objects.read().unwrap();
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(
        &self,
        namespace: &str,
        selector: Option<(&str, &str)>,
    ) -> Result<Vec<LiveObject>, StoreError> {
        let objects = self.objects.read().unwrap();
        let mut matched: Vec<LiveObject> = objects
            .values()
            .filter(|obj| obj.key.namespace == namespace)
            .filter(|obj| match selector {
                Some((label, value)) => {
                    obj.labels.get(label).map(String::as_str) == Some(value)
                }
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(matched)
    }

    async fn apply(
        &self,
        manifest: ManifestObject,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        Self::validate(&manifest)?;

        let mut objects = self.objects.write().unwrap();
        match objects.get_mut(&manifest.key) {
            None => {
                if expected_version.is_some() {
                    return Err(StoreError::Conflict {
                        key: manifest.key,
                        expected: expected_version,
                        actual: 0,
                    });
                }
                let version = self.next_version();
                let live = LiveObject {
                    key: manifest.key.clone(),
                    labels: manifest.labels,
                    spec: manifest.spec,
                    status: Value::Null,
                    resource_version: version,
                };
                objects.insert(manifest.key, live.clone());
                drop(objects);
                self.emit(WatchEvent::Added(live));
                Ok(version)
            }
            Some(existing) => {
                match expected_version {
                    None => {
                        return Err(StoreError::Conflict {
                            key: manifest.key,
                            expected: None,
                            actual: existing.resource_version,
                        });
                    }
                    Some(expected) if expected != existing.resource_version => {
                        return Err(StoreError::Conflict {
                            key: manifest.key,
                            expected: expected_version,
                            actual: existing.resource_version,
                        });
                    }
                    Some(_) => {}
                }

                // Idempotent apply: identical payload changes nothing
                if existing.spec == manifest.spec
                    && existing.labels == manifest.labels
                {
                    return Ok(existing.resource_version);
                }

                let version = self.next_version();
                existing.labels = manifest.labels;
                existing.spec = manifest.spec;
                existing.resource_version = version;
                let live = existing.clone();
                drop(objects);
                self.emit(WatchEvent::Modified(live));
                Ok(version)
            }
        }
    }

    async fn delete(
        &self,
        key: &ObjectKey,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.write().unwrap();
        let existing = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if existing.resource_version != expected_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: Some(expected_version),
                actual: existing.resource_version,
            });
        }
        if let Some(removed) = objects.remove(key) {
            drop(objects);
            self.emit(WatchEvent::Deleted(removed));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: Value,
    ) -> Result<u64, StoreError> {
        let mut objects = self.objects.write().unwrap();
        let existing = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let version = self.next_version();
        existing.status = status;
        existing.resource_version = version;
        let live = existing.clone();
        drop(objects);
        self.emit(WatchEvent::Modified(live));
        Ok(version)
    }

    async fn watch(&self, namespace: &str) -> WatchSubscription {
        WatchSubscription::new(namespace, self.events.subscribe())
    }
}
