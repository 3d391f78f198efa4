//! Application domain types

use serde::{Deserialize, Serialize};

/// A tracked unit of desired-state-to-live-cluster mapping.
///
/// Structure shared between the controller (persists, reconciles) and the
/// CLI (displays). Mutated only through explicit policy edits; sync progress
/// lives in [`crate::domain::sync::SyncStatus`], not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Unique name, also used as the owner label value on live objects
    pub name: String,
    /// Source repository holding the deployment manifests
    pub repo_url: String,
    /// Path within the repository to render
    pub path: String,
    /// Branch, tag or fixed commit to track
    pub target_revision: String,
    /// Namespace live objects are applied into
    pub dest_namespace: String,
    pub sync_policy: SyncPolicy,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// How an application is driven toward its desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub mode: SyncMode,
    /// Correct manual drift detected outside a reconciliation pass
    pub self_heal: bool,
    /// Delete live objects no longer present in desired state
    pub prune: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Reconcile only on explicit sync requests
    Manual,
    /// Reconcile whenever a new source fingerprint is observed
    Automated,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            mode: SyncMode::Manual,
            self_heal: false,
            prune: false,
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Manual => write!(f, "Manual"),
            SyncMode::Automated => write!(f, "Automated"),
        }
    }
}

impl Application {
    /// Validates the application definition.
    ///
    /// Names double as label values and object names, so they follow the
    /// usual DNS-label shape: lowercase alphanumerics and `-`, at most 63
    /// characters, starting and ending alphanumeric.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;

        if self.repo_url.is_empty() {
            return Err("repo_url cannot be empty".to_string());
        }

        if self.target_revision.is_empty() {
            return Err("target_revision cannot be empty".to_string());
        }

        if self.dest_namespace.is_empty() {
            return Err("dest_namespace cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Validates an application name (DNS-label shape)
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if name.len() > 63 {
        return Err(format!("name '{}' exceeds 63 characters", name));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());

    if !valid_chars || !valid_edges {
        return Err(format!(
            "name '{}' must be lowercase alphanumerics and '-', starting and ending alphanumeric",
            name
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_accepts_dns_labels() {
        assert!(validate_name("demo-app").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("app-2").is_ok());
    }

    #[test]
    fn test_validate_name_rejects_bad_shapes() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Demo").is_err());
        assert!(validate_name("-app").is_err());
        assert!(validate_name("app-").is_err());
        assert!(validate_name("app_1").is_err());
        assert!(validate_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_default_policy_is_manual() {
        let policy = SyncPolicy::default();
        assert_eq!(policy.mode, SyncMode::Manual);
        assert!(!policy.self_heal);
        assert!(!policy.prune);
    }
}
