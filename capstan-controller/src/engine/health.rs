//! Health classification
//!
//! Aggregates per-object outcomes and live workload readiness into one
//! application health value.

use capstan_core::domain::object::LiveObject;
use capstan_core::domain::sync::{Health, ResourceAction, ResourceOutcome};
use serde_json::Value;

/// Whether a live workload reports ready.
///
/// Workloads declare `spec.replicas` and the cluster side reports
/// `status.readyReplicas`; ready means the reported count covers the
/// declared one. Kinds without a replica notion count as ready.
pub fn workload_ready(live: &LiveObject) -> bool {
    let Some(declared) = live
        .spec
        .get("spec")
        .and_then(|spec| spec.get("replicas"))
        .and_then(Value::as_u64)
    else {
        return true;
    };
    let ready = live
        .status
        .get("readyReplicas")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    ready >= declared
}

/// Classifies application health from pass outcomes and the owned live set.
///
/// Degraded wins over everything (an object exhausted its retries or
/// failed outright); orphans left in place by a disabled prune policy keep
/// the application Progressing; otherwise health follows workload
/// readiness.
pub fn classify(outcomes: &[ResourceOutcome], owned: &[LiveObject]) -> Health {
    if outcomes
        .iter()
        .any(|outcome| outcome.action == ResourceAction::Failed)
    {
        return Health::Degraded;
    }
    if outcomes
        .iter()
        .any(|outcome| outcome.action == ResourceAction::PruneSkipped)
    {
        return Health::Progressing;
    }
    if owned.iter().all(workload_ready) {
        Health::Healthy
    } else {
        Health::Progressing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::domain::object::ObjectKey;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn workload(replicas: u64, ready: Option<u64>) -> LiveObject {
        LiveObject {
            key: ObjectKey::new("Deployment", "demo", "web"),
            labels: BTreeMap::new(),
            spec: json!({"spec": {"replicas": replicas}}),
            status: match ready {
                Some(n) => json!({"readyReplicas": n}),
                None => Value::Null,
            },
            resource_version: 1,
        }
    }

    fn outcome(action: ResourceAction) -> ResourceOutcome {
        ResourceOutcome::new(ObjectKey::new("Deployment", "demo", "web"), action)
    }

    #[test]
    fn test_readiness_math() {
        assert!(workload_ready(&workload(2, Some(2))));
        assert!(workload_ready(&workload(2, Some(3))));
        assert!(!workload_ready(&workload(2, Some(1))));
        assert!(!workload_ready(&workload(2, None)));
        // Zero replicas need nothing ready
        assert!(workload_ready(&workload(0, None)));
    }

    #[test]
    fn test_kinds_without_replicas_count_as_ready() {
        let service = LiveObject {
            key: ObjectKey::new("Service", "demo", "web"),
            labels: BTreeMap::new(),
            spec: json!({"spec": {"port": 80}}),
            status: Value::Null,
            resource_version: 1,
        };
        assert!(workload_ready(&service));
    }

    #[test]
    fn test_degraded_wins_over_everything() {
        let outcomes = vec![
            outcome(ResourceAction::Updated),
            outcome(ResourceAction::Failed),
        ];
        let owned = vec![workload(1, Some(1))];
        assert_eq!(classify(&outcomes, &owned), Health::Degraded);
    }

    #[test]
    fn test_skipped_prunes_keep_the_application_progressing() {
        let outcomes = vec![
            outcome(ResourceAction::Unchanged),
            outcome(ResourceAction::PruneSkipped),
        ];
        let owned = vec![workload(1, Some(1))];
        assert_eq!(classify(&outcomes, &owned), Health::Progressing);
    }

    #[test]
    fn test_healthy_requires_ready_workloads() {
        let outcomes = vec![outcome(ResourceAction::Created)];
        assert_eq!(
            classify(&outcomes, &[workload(2, Some(1))]),
            Health::Progressing
        );
        assert_eq!(
            classify(&outcomes, &[workload(2, Some(2))]),
            Health::Healthy
        );
    }
}
