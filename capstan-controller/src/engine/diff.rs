//! Desired-vs-live diffing
//!
//! Computes the three working sets of a reconciliation pass: objects to
//! create, objects to update, and live orphans eligible for pruning.
//! Equality is semantic: null values in the desired spec and fields only
//! the server populates on the live side are not drift.

use capstan_core::domain::object::{LiveObject, ManifestObject, ObjectKey};
use capstan_render::order::apply_wave;
use serde_json::Value;
use std::collections::HashMap;

/// How one desired object will be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Update { current_version: u64 },
}

/// Result of diffing one application's desired state against its live set
#[derive(Debug, Default)]
pub struct DiffPlan {
    pub to_create: Vec<ObjectKey>,
    pub to_update: Vec<ObjectKey>,
    /// Orphans in reverse apply order, so pruning tears down dependents
    /// before their dependencies
    pub to_prune: Vec<LiveObject>,
    pub unchanged: Vec<ObjectKey>,
    actions: HashMap<ObjectKey, PlannedAction>,
}

impl DiffPlan {
    pub fn action_for(&self, key: &ObjectKey) -> Option<PlannedAction> {
        self.actions.get(key).copied()
    }

    /// True when live state already matches desired state exactly
    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty()
            && self.to_update.is_empty()
            && self.to_prune.is_empty()
    }
}

/// Diffs desired objects against the live objects owned by the same
/// application. Both inputs are complete views; no caching in between.
pub fn diff(desired: &[ManifestObject], live: &[LiveObject]) -> DiffPlan {
    let live_by_key: HashMap<&ObjectKey, &LiveObject> =
        live.iter().map(|obj| (&obj.key, obj)).collect();

    let mut plan = DiffPlan::default();
    for obj in desired {
        match live_by_key.get(&obj.key) {
            None => {
                plan.to_create.push(obj.key.clone());
                plan.actions.insert(obj.key.clone(), PlannedAction::Create);
            }
            Some(current) if !semantic_eq(obj, current) => {
                plan.to_update.push(obj.key.clone());
                plan.actions.insert(
                    obj.key.clone(),
                    PlannedAction::Update {
                        current_version: current.resource_version,
                    },
                );
            }
            Some(_) => plan.unchanged.push(obj.key.clone()),
        }
    }

    plan.to_prune = live
        .iter()
        .filter(|obj| !desired.iter().any(|d| d.key == obj.key))
        .cloned()
        .collect();
    plan.to_prune.sort_by(|a, b| {
        apply_wave(&b.key.kind)
            .cmp(&apply_wave(&a.key.kind))
            .then_with(|| b.key.cmp(&a.key))
    });

    plan
}

/// Whether a live object already reflects the desired object.
///
/// Compares labels and spec; the status payload is cluster-owned and never
/// part of drift.
pub fn semantic_eq(desired: &ManifestObject, live: &LiveObject) -> bool {
    let labels_match = desired
        .labels
        .iter()
        .all(|(key, value)| live.labels.get(key) == Some(value));
    labels_match && spec_matches(&desired.spec, &live.spec)
}

/// Recursive comparison: every field the desired spec sets must match the
/// live value; desired nulls mean "unset, ignore"; live-only fields are
/// server-populated and ignored.
fn spec_matches(desired: &Value, live: &Value) -> bool {
    if desired.is_null() {
        return true;
    }
    match (desired, live) {
        (Value::Object(desired_map), Value::Object(live_map)) => {
            desired_map.iter().all(|(key, desired_value)| {
                if desired_value.is_null() {
                    return true;
                }
                match live_map.get(key) {
                    Some(live_value) => spec_matches(desired_value, live_value),
                    None => false,
                }
            })
        }
        _ => desired == live,
    }
}
