//! Build executors
//!
//! The pipeline trigger hands the actual build-and-push step to an
//! executor. Two ship here: a deterministic in-process simulator for
//! local use and tests, and a shell-out executor for wiring in a real
//! build script.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Build step failures
#[derive(Debug, Error)]
pub enum BuildError {
    /// The build ran and failed
    #[error("build failed: {0}")]
    Failed(String),
    /// The build could not be started at all
    #[error("build could not start: {0}")]
    Launch(String),
}

/// Runs one build-and-push attempt and yields the pushed image digest
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn run_build(
        &self,
        source_ref: &str,
        image_tag: &str,
    ) -> Result<String, BuildError>;
}

/// In-process builder with a configurable latency.
///
/// The digest is derived from the inputs alone, so resubmitting the same
/// ref and tag yields the same digest.
pub struct SimulatedBuilder {
    latency: Duration,
}

impl SimulatedBuilder {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl BuildExecutor for SimulatedBuilder {
    async fn run_build(
        &self,
        source_ref: &str,
        image_tag: &str,
    ) -> Result<String, BuildError> {
        tokio::time::sleep(self.latency).await;
        let mut hasher = Sha256::new();
        hasher.update(source_ref.as_bytes());
        hasher.update([0]);
        hasher.update(image_tag.as_bytes());
        Ok(format!("sha256:{:x}", hasher.finalize()))
    }
}

/// Shells out to a configured build command.
///
/// The command receives `CAPSTAN_SOURCE_REF` and `CAPSTAN_IMAGE_TAG` in
/// its environment and must print the image digest as its last non-empty
/// stdout line.
pub struct CommandBuilder {
    command: String,
}

impl CommandBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl BuildExecutor for CommandBuilder {
    async fn run_build(
        &self,
        source_ref: &str,
        image_tag: &str,
    ) -> Result<String, BuildError> {
        debug!(
            "Running build command for ref {} tag {}",
            source_ref, image_tag
        );
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("CAPSTAN_SOURCE_REF", source_ref)
            .env("CAPSTAN_IMAGE_TAG", image_tag)
            .output()
            .await
            .map_err(|e| BuildError::Launch(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(BuildError::Failed(if detail.is_empty() {
                format!("build command exited with {}", output.status)
            } else {
                format!(
                    "build command exited with {}: {}",
                    output.status, detail
                )
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(digest) => Ok(digest.trim().to_string()),
            None => Err(BuildError::Failed(
                "build command produced no digest on stdout".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_builder_is_deterministic() {
        let builder = SimulatedBuilder::new(Duration::ZERO);

        let a = builder.run_build("main", "shop:v1").await.unwrap();
        let b = builder.run_build("main", "shop:v1").await.unwrap();
        let c = builder.run_build("main", "shop:v2").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn test_command_builder_takes_last_stdout_line() {
        let builder = CommandBuilder::new(
            "echo building step 1; echo building step 2; echo sha256:abc123",
        );

        let digest = builder.run_build("main", "shop:v1").await.unwrap();
        assert_eq!(digest, "sha256:abc123");
    }

    #[tokio::test]
    async fn test_command_builder_exposes_inputs_in_env() {
        let builder = CommandBuilder::new(
            "echo \"digest-$CAPSTAN_SOURCE_REF-$CAPSTAN_IMAGE_TAG\"",
        );

        let digest = builder.run_build("main", "shop:v1").await.unwrap();
        assert_eq!(digest, "digest-main-shop:v1");
    }

    #[tokio::test]
    async fn test_command_builder_failure_carries_stderr() {
        let builder = CommandBuilder::new("echo compile error >&2; exit 3");

        let err = builder.run_build("main", "shop:v1").await.unwrap_err();
        match err {
            BuildError::Failed(message) => {
                assert!(message.contains("compile error"));
            }
            BuildError::Launch(message) => {
                panic!("expected a build failure, got launch error: {message}")
            }
        }
    }
}
