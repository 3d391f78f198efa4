//! Object model shared between the store, the renderer and the reconciler

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Label attached to every live object applied on behalf of an application.
/// Reconciliation passes list owned objects by this label.
pub const OWNER_LABEL: &str = "capstan.io/application";

/// Identity of an object in the store: kind + namespace + name
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// One desired-state object rendered from a manifest source.
///
/// The spec payload is canonical JSON (serde_json sorts map keys), so two
/// renders of the same source serialize byte-identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestObject {
    pub key: ObjectKey,
    pub labels: BTreeMap<String, String>,
    pub spec: Value,
}

impl ManifestObject {
    pub fn new(key: ObjectKey, spec: Value) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            spec,
        }
    }

    /// Application this object belongs to, if labeled
    pub fn owner(&self) -> Option<&str> {
        self.labels.get(OWNER_LABEL).map(String::as_str)
    }

    /// Labels the object as owned by the given application
    pub fn with_owner(mut self, application: &str) -> Self {
        self.labels
            .insert(OWNER_LABEL.to_string(), application.to_string());
        self
    }
}

/// Observed state of one object in the store.
///
/// `resource_version` increases monotonically per object and guards
/// optimistic-concurrency updates. The reconciler never holds these beyond
/// one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveObject {
    pub key: ObjectKey,
    pub labels: BTreeMap<String, String>,
    pub spec: Value,
    /// Status payload written by whatever owns the object at runtime
    /// (e.g. a workload reporting ready replicas). Null until reported.
    pub status: Value,
    pub resource_version: u64,
}

impl LiveObject {
    /// Application this object belongs to, if labeled
    pub fn owner(&self) -> Option<&str> {
        self.labels.get(OWNER_LABEL).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_owner_label_round_trip() {
        let obj = ManifestObject::new(
            ObjectKey::new("Deployment", "demo", "web"),
            json!({"replicas": 1}),
        )
        .with_owner("demo-app");

        assert_eq!(obj.owner(), Some("demo-app"));
        assert_eq!(obj.labels.get(OWNER_LABEL).unwrap(), "demo-app");
    }

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::new("Service", "demo", "web");
        assert_eq!(key.to_string(), "Service/demo/web");
    }
}
