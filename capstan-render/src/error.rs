//! Render and source error types
//!
//! Render failures are terminal for the pass that requested them: the
//! reconciler never applies a partially rendered snapshot. Transport
//! failures (`Unreachable`) are the one retryable case and are handled
//! by the source watcher's backoff, not here.

use thiserror::Error;

/// Errors raised while resolving revisions or fetching trees
#[derive(Debug, Error)]
pub enum SourceError {
    /// The repository or revision does not exist
    #[error("source not found: {0}")]
    NotFound(String),

    /// The transport failed; the caller may retry with backoff
    #[error("source unreachable: {0}")]
    Unreachable(String),
}

/// Errors raised while rendering a snapshot
#[derive(Debug, Error)]
pub enum RenderError {
    /// A repository, revision, or referenced manifest file does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A manifest file failed to parse or is structurally invalid
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// An overlay patch could not be applied to the base objects
    #[error("patch conflict: {0}")]
    PatchConflict(String),

    /// The source transport failed; the caller may retry with backoff
    #[error("source unreachable: {0}")]
    Unreachable(String),
}

impl RenderError {
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// True for failures worth retrying on the next poll tick
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Unreachable(_))
    }
}

impl From<SourceError> for RenderError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(what) => RenderError::NotFound(what),
            SourceError::Unreachable(why) => RenderError::Unreachable(why),
        }
    }
}
