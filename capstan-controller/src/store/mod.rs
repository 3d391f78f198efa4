//! Object store access
//!
//! The typed client everything else speaks to. The trait models a
//! Kubernetes-like API surface: keyed CRUD with optimistic concurrency,
//! label-filtered listing, a status side channel, and watch streams.
//! `memory.rs` is the in-process backend; a real cluster adapter would
//! implement the same trait.

pub mod memory;

use async_trait::async_trait;
use capstan_core::domain::object::{LiveObject, ManifestObject, ObjectKey};
use capstan_core::error::StoreError;
use serde_json::Value;
use tokio::sync::broadcast;

pub use memory::MemoryStore;

/// Change notification delivered on a watch stream
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(LiveObject),
    Modified(LiveObject),
    /// Carries the last known state of the deleted object
    Deleted(LiveObject),
    /// The subscriber fell behind and missed events; it should re-list
    /// instead of trusting its incremental view
    Overflowed,
}

impl WatchEvent {
    pub fn object(&self) -> Option<&LiveObject> {
        match self {
            WatchEvent::Added(obj)
            | WatchEvent::Modified(obj)
            | WatchEvent::Deleted(obj) => Some(obj),
            WatchEvent::Overflowed => None,
        }
    }
}

/// One consumer's view of a store's change feed, filtered to a namespace.
///
/// Backed by a bounded broadcast channel: a slow consumer never blocks the
/// store, it observes `Overflowed` instead of the dropped events.
pub struct WatchSubscription {
    namespace: String,
    rx: broadcast::Receiver<WatchEvent>,
}

impl WatchSubscription {
    pub(crate) fn new(
        namespace: impl Into<String>,
        rx: broadcast::Receiver<WatchEvent>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            rx,
        }
    }

    /// Next event for the subscribed namespace; None once the store is gone
    pub async fn next(&mut self) -> Option<WatchEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => match event.object() {
                    Some(obj) if obj.key.namespace == self.namespace => {
                        return Some(event);
                    }
                    Some(_) => continue,
                    None => return Some(event),
                },
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(WatchEvent::Overflowed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Typed object store client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one object by key
    async fn get(&self, key: &ObjectKey) -> Result<LiveObject, StoreError>;

    /// Lists objects in a namespace, optionally filtered by one label pair
    async fn list(
        &self,
        namespace: &str,
        selector: Option<(&str, &str)>,
    ) -> Result<Vec<LiveObject>, StoreError>;

    /// Creates or updates an object under optimistic concurrency.
    ///
    /// `expected_version` None means "create, must not exist"; Some(v) means
    /// "update, current version must be v". A mismatch returns
    /// `StoreError::Conflict` and changes nothing. Applying an identical
    /// payload is a no-op that returns the current version and emits no
    /// watch event.
    async fn apply(
        &self,
        manifest: ManifestObject,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Deletes an object; the expected version must match
    async fn delete(
        &self,
        key: &ObjectKey,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Writes the cluster-owned status payload of an object, bumping its
    /// version. This side channel is how runtime state (e.g. ready
    /// replicas) enters the store.
    async fn update_status(
        &self,
        key: &ObjectKey,
        status: Value,
    ) -> Result<u64, StoreError>;

    /// Subscribes to changes in one namespace
    async fn watch(&self, namespace: &str) -> WatchSubscription;
}
