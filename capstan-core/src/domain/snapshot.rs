//! Source fingerprints and desired-state snapshots

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::object::{ManifestObject, ObjectKey};

/// Content hash identifying an immutable source revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Computes a fingerprint as the sha256 hex digest of the given bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines and CLI output
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable rendering of an application's manifests at one source
/// fingerprint.
///
/// Objects are held in apply order (namespaces, RBAC, config, workloads,
/// network exposure). Two snapshots with the same fingerprint render to
/// byte-identical object sets; nothing mutates a snapshot after rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateSnapshot {
    pub fingerprint: Fingerprint,
    pub objects: Vec<ManifestObject>,
}

impl DesiredStateSnapshot {
    pub fn new(fingerprint: Fingerprint, objects: Vec<ManifestObject>) -> Self {
        Self {
            fingerprint,
            objects,
        }
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.iter().any(|o| &o.key == key)
    }

    pub fn find(&self, key: &ObjectKey) -> Option<&ManifestObject> {
        self.objects.iter().find(|o| &o.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_of_bytes_is_stable() {
        let a = Fingerprint::of_bytes(b"rev-1");
        let b = Fingerprint::of_bytes(b"rev-1");
        let c = Fingerprint::of_bytes(b"rev-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_short() {
        let fp = Fingerprint::new("abcdef0123456789");
        assert_eq!(fp.short(), "abcdef01");

        let tiny = Fingerprint::new("abc");
        assert_eq!(tiny.short(), "abc");
    }
}
