//! Apply-order waves
//!
//! Objects apply in dependency-respecting waves so a workload never lands
//! before the namespace, RBAC, or config it needs. Pruning runs the same
//! order in reverse.

use capstan_core::domain::object::ManifestObject;
use std::cmp::Ordering;

/// Wave an object kind applies in. Lower waves apply first.
///
/// Unrecognized kinds apply with the workloads: late enough that their
/// dependencies exist, early enough that exposure objects can point at
/// them.
pub fn apply_wave(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "ServiceAccount" | "Role" | "RoleBinding" | "ClusterRole"
        | "ClusterRoleBinding" => 1,
        "ConfigMap" | "Secret" | "PersistentVolumeClaim" => 2,
        "Service" | "Route" | "Ingress" => 4,
        _ => 3,
    }
}

/// Total apply order: wave, then key, so equal snapshots sort identically
pub fn apply_order(a: &ManifestObject, b: &ManifestObject) -> Ordering {
    apply_wave(&a.key.kind)
        .cmp(&apply_wave(&b.key.kind))
        .then_with(|| a.key.cmp(&b.key))
}

/// Sorts objects in place into apply order
pub fn sort_for_apply(objects: &mut [ManifestObject]) {
    objects.sort_by(apply_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::domain::object::ObjectKey;
    use serde_json::json;

    fn obj(kind: &str, name: &str) -> ManifestObject {
        ManifestObject::new(ObjectKey::new(kind, "demo", name), json!({}))
    }

    #[test]
    fn test_waves_order_namespaces_first_and_exposure_last() {
        let mut objects = vec![
            obj("Service", "web"),
            obj("Deployment", "web"),
            obj("ConfigMap", "web-config"),
            obj("Namespace", "demo"),
            obj("ServiceAccount", "web"),
        ];
        sort_for_apply(&mut objects);

        let kinds: Vec<&str> =
            objects.iter().map(|o| o.key.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "Namespace",
                "ServiceAccount",
                "ConfigMap",
                "Deployment",
                "Service"
            ]
        );
    }

    #[test]
    fn test_unknown_kinds_land_with_workloads() {
        assert_eq!(apply_wave("CronTab"), apply_wave("Deployment"));
        assert!(apply_wave("CronTab") > apply_wave("Secret"));
        assert!(apply_wave("CronTab") < apply_wave("Ingress"));
    }

    #[test]
    fn test_ties_break_by_kind_then_name() {
        let mut objects = vec![
            obj("StatefulSet", "db"),
            obj("Deployment", "web"),
            obj("Deployment", "api"),
        ];
        sort_for_apply(&mut objects);

        let names: Vec<&str> =
            objects.iter().map(|o| o.key.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web", "db"]);
    }
}
