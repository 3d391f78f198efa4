//! Source repository access
//!
//! Abstracts where manifests come from:
//! - Resolving a symbolic revision (branch name) to an immutable fingerprint
//! - Fetching the file tree under a path at a fingerprint
//!
//! Two transports ship here: an in-memory fixture store used by tests and
//! local seeding, and a git-CLI transport that reads local clones.

use async_trait::async_trait;
use capstan_core::domain::snapshot::Fingerprint;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::process::Command;
use tracing::debug;

use crate::error::SourceError;

/// File tree of one repository path at one fingerprint.
///
/// File names are relative to the requested path and sorted, so iteration
/// order is stable across fetches.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    files: BTreeMap<String, String>,
}

impl SourceTree {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// File names in sorted order
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Read access to manifest sources
///
/// Implementations must be cheap to call repeatedly: the source watcher
/// resolves on every poll tick and only fetches the tree when the
/// fingerprint moved.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Resolves a symbolic revision (branch name or full fingerprint) to
    /// the immutable fingerprint it currently points at
    async fn resolve(
        &self,
        repo_url: &str,
        revision: &str,
    ) -> Result<Fingerprint, SourceError>;

    /// Fetches the file tree under `path` at the given fingerprint.
    /// File names in the returned tree are relative to `path`.
    async fn tree(
        &self,
        repo_url: &str,
        fingerprint: &Fingerprint,
        path: &str,
    ) -> Result<SourceTree, SourceError>;
}

// ============================================================================
// In-memory fixture transport
// ============================================================================

#[derive(Default)]
struct Fixture {
    branches: HashMap<String, Fingerprint>,
    trees: HashMap<Fingerprint, BTreeMap<String, String>>,
}

/// In-memory source repository.
///
/// Revisions are pushed programmatically; each push computes a content
/// fingerprint, stores the tree under it, and moves the branch head. Old
/// fingerprints stay resolvable, matching how a real repository keeps
/// history reachable.
#[derive(Default)]
pub struct FixtureRepository {
    repos: RwLock<HashMap<String, Fixture>>,
}

impl FixtureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new revision to `branch` of `repo_url` and returns its
    /// fingerprint
    pub fn push(
        &self,
        repo_url: &str,
        branch: &str,
        files: &[(&str, &str)],
    ) -> Fingerprint {
        let tree: BTreeMap<String, String> = files
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_string()))
            .collect();

        let mut buf = Vec::new();
        for (name, content) in &tree {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(content.as_bytes());
            buf.push(0);
        }
        let fingerprint = Fingerprint::of_bytes(&buf);

        let mut repos = self.repos.write().unwrap();
        let fixture = repos.entry(repo_url.to_string()).or_default();
        fixture.trees.insert(fingerprint.clone(), tree);
        fixture
            .branches
            .insert(branch.to_string(), fingerprint.clone());

        fingerprint
    }
}

#[async_trait]
impl SourceRepository for FixtureRepository {
    async fn resolve(
        &self,
        repo_url: &str,
        revision: &str,
    ) -> Result<Fingerprint, SourceError> {
        let repos = self.repos.read().unwrap();
        let fixture = repos
            .get(repo_url)
            .ok_or_else(|| SourceError::NotFound(repo_url.to_string()))?;

        // A full fingerprint resolves to itself as long as it is known
        let literal = Fingerprint::new(revision);
        if fixture.trees.contains_key(&literal) {
            return Ok(literal);
        }

        fixture.branches.get(revision).cloned().ok_or_else(|| {
            SourceError::NotFound(format!("{revision} in {repo_url}"))
        })
    }

    async fn tree(
        &self,
        repo_url: &str,
        fingerprint: &Fingerprint,
        path: &str,
    ) -> Result<SourceTree, SourceError> {
        let repos = self.repos.read().unwrap();
        let fixture = repos
            .get(repo_url)
            .ok_or_else(|| SourceError::NotFound(repo_url.to_string()))?;
        let full = fixture.trees.get(fingerprint).ok_or_else(|| {
            SourceError::NotFound(format!(
                "{} in {repo_url}",
                fingerprint.short()
            ))
        })?;

        let files = filter_under_path(full, path);
        if files.is_empty() {
            return Err(SourceError::NotFound(format!(
                "path '{path}' at {} in {repo_url}",
                fingerprint.short()
            )));
        }
        Ok(SourceTree::new(files))
    }
}

/// Keeps entries under `path` and strips the prefix. An empty path or "."
/// selects the whole tree.
fn filter_under_path(
    full: &BTreeMap<String, String>,
    path: &str,
) -> BTreeMap<String, String> {
    let path = path.trim_matches('/');
    if path.is_empty() || path == "." {
        return full.clone();
    }
    let prefix = format!("{path}/");
    full.iter()
        .filter_map(|(name, content)| {
            name.strip_prefix(&prefix)
                .map(|rel| (rel.to_string(), content.clone()))
        })
        .collect()
}

// ============================================================================
// Git CLI transport
// ============================================================================

/// Source repository backed by local git clones.
///
/// Clones live under a configured root directory, one per repository,
/// named after the last segment of the repository URL (minus any `.git`
/// suffix). Reads shell out to `git -C <clone>` so no git library binding
/// is needed; something else is expected to keep the clones fetched.
pub struct GitCliRepository {
    clones_root: PathBuf,
}

impl GitCliRepository {
    pub fn new(clones_root: impl Into<PathBuf>) -> Self {
        Self {
            clones_root: clones_root.into(),
        }
    }

    /// Directory of the local clone for a repository URL
    fn clone_dir(&self, repo_url: &str) -> PathBuf {
        let name = repo_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(repo_url)
            .trim_end_matches(".git");
        self.clones_root.join(name)
    }

    async fn git(
        &self,
        repo_url: &str,
        args: &[&str],
    ) -> Result<String, SourceError> {
        let dir = self.clone_dir(repo_url);
        if !dir.is_dir() {
            return Err(SourceError::NotFound(format!(
                "no local clone for {repo_url} under {}",
                self.clones_root.display()
            )));
        }

        let output = Command::new("git")
            .arg("-C")
            .arg(&dir)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                SourceError::Unreachable(format!("failed to run git: {e}"))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("git {} stderr: {}", args.join(" "), stderr.trim());
        }

        if !output.status.success() {
            return Err(SourceError::NotFound(format!(
                "git {} failed for {repo_url}: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SourceRepository for GitCliRepository {
    async fn resolve(
        &self,
        repo_url: &str,
        revision: &str,
    ) -> Result<Fingerprint, SourceError> {
        let stdout = self
            .git(repo_url, &["rev-parse", "--verify", revision])
            .await?;
        Ok(Fingerprint::new(stdout.trim()))
    }

    async fn tree(
        &self,
        repo_url: &str,
        fingerprint: &Fingerprint,
        path: &str,
    ) -> Result<SourceTree, SourceError> {
        let path = path.trim_matches('/');
        let spec = if path.is_empty() || path == "." {
            fingerprint.as_str().to_string()
        } else {
            format!("{}:{path}", fingerprint.as_str())
        };

        // List file names first, then read each blob individually
        let listing = self
            .git(
                repo_url,
                &["ls-tree", "-r", "--name-only", "--full-tree", &spec],
            )
            .await?;

        let mut files = BTreeMap::new();
        for name in listing.lines().filter(|l| !l.trim().is_empty()) {
            let blob = if path.is_empty() || path == "." {
                format!("{}:{name}", fingerprint.as_str())
            } else {
                format!("{}:{path}/{name}", fingerprint.as_str())
            };
            let content = self.git(repo_url, &["show", &blob]).await?;
            files.insert(name.to_string(), content);
        }

        if files.is_empty() {
            return Err(SourceError::NotFound(format!(
                "path '{path}' at {} in {repo_url}",
                fingerprint.short()
            )));
        }
        Ok(SourceTree::new(files))
    }
}
