//! Capstan Manifest Rendering
//!
//! This crate turns a source repository revision into a desired-state
//! snapshot. It includes:
//! - SourceRepository trait with in-memory and git-CLI transports
//! - Multi-document YAML manifest parsing into typed objects
//! - Overlay patches with merge-patch semantics
//! - Dependency-respecting apply-order waves
//!
//! Rendering is all-or-nothing: any failure aborts the snapshot with
//! nothing produced, so the reconciler never sees a half-rendered set.

pub mod error;
pub mod manifest;
pub mod order;
pub mod overlay;
pub mod source;

pub use error::{RenderError, SourceError};
pub use manifest::RenderConfig;
pub use source::{
    FixtureRepository, GitCliRepository, SourceRepository, SourceTree,
};

use capstan_core::domain::object::ObjectKey;
use capstan_core::domain::snapshot::{DesiredStateSnapshot, Fingerprint};
use std::collections::HashSet;
use tracing::debug;

/// Renders the manifests of one application path at one fingerprint.
///
/// Reads the tree, applies the render configuration (explicit `capstan.yaml`
/// or implicit file discovery), parses base manifests, layers overlays in
/// declaration order, and sorts the result into apply order. The same
/// fingerprint always renders the same snapshot.
///
/// # Arguments
/// * `repo` - Source transport to read from
/// * `repo_url` - Repository the application tracks
/// * `fingerprint` - Resolved immutable revision to render
/// * `path` - Path within the repository holding the manifests
///
/// # Errors
/// Returns `RenderError` on missing files, malformed manifests, or overlay
/// conflicts; nothing is produced on failure.
pub async fn render(
    repo: &dyn SourceRepository,
    repo_url: &str,
    fingerprint: &Fingerprint,
    path: &str,
) -> Result<DesiredStateSnapshot, RenderError> {
    let tree = repo.tree(repo_url, fingerprint, path).await?;

    let config = match tree.get(manifest::CONFIG_FILE) {
        Some(raw) => manifest::parse_config(raw)?,
        None => RenderConfig::discover(&tree),
    };

    let mut objects = Vec::new();
    let mut seen: HashSet<ObjectKey> = HashSet::new();
    for file in &config.resources {
        let content = tree.get(file).ok_or_else(|| {
            RenderError::NotFound(format!("resource file '{file}'"))
        })?;
        for object in manifest::parse_documents(file, content)? {
            if !seen.insert(object.key.clone()) {
                return Err(RenderError::parse(
                    file.clone(),
                    format!("duplicate object {}", object.key),
                ));
            }
            objects.push(object);
        }
    }

    for file in &config.overlays {
        let content = tree.get(file).ok_or_else(|| {
            RenderError::NotFound(format!("overlay file '{file}'"))
        })?;
        overlay::apply_overlay_file(&mut objects, file, content)?;
    }

    order::sort_for_apply(&mut objects);

    debug!(
        "Rendered {} objects from {}/{} at {}",
        objects.len(),
        repo_url,
        path,
        fingerprint.short()
    );

    Ok(DesiredStateSnapshot::new(fingerprint.clone(), objects))
}
