//! Pipeline trigger
//!
//! Accepts build-and-push submissions, executes them in the background
//! and records exactly one terminal transition per run. Terminal runs are
//! immutable; a run linked to an application refreshes that application
//! on success so the new image rolls out.

pub mod executor;

use capstan_core::domain::run::{PipelineRun, RunOutcome};
use capstan_core::dto::run::SubmitRun;
use capstan_core::error::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::repository;
use crate::store::ObjectStore;

pub use executor::{BuildError, BuildExecutor, CommandBuilder, SimulatedBuilder};

/// Pipeline trigger failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline run {0} not found")]
    RunNotFound(Uuid),
    #[error("application {0} not found")]
    ApplicationNotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Submits, tracks and reports build-and-push runs
pub struct PipelineService {
    store: Arc<dyn ObjectStore>,
    executor: Arc<dyn BuildExecutor>,
    engine: Arc<Engine>,
    /// Completion signals for runs still in flight, keyed by run id
    completions: Arc<Mutex<HashMap<Uuid, Arc<Notify>>>>,
}

impl PipelineService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        executor: Arc<dyn BuildExecutor>,
        engine: Arc<Engine>,
    ) -> Self {
        Self {
            store,
            executor,
            engine,
            completions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validates and persists a new pending run, then starts its build in
    /// the background. Returns the pending record immediately.
    pub async fn submit(
        &self,
        request: SubmitRun,
    ) -> Result<PipelineRun, PipelineError> {
        if request.source_ref.is_empty() {
            return Err(PipelineError::Validation(
                "source_ref cannot be empty".to_string(),
            ));
        }
        if request.image_tag.is_empty() {
            return Err(PipelineError::Validation(
                "image_tag cannot be empty".to_string(),
            ));
        }
        if let Some(application) = &request.application {
            let found = repository::application::find_by_name(
                self.store.as_ref(),
                application,
            )
            .await?;
            if found.is_none() {
                return Err(PipelineError::ApplicationNotFound(
                    application.clone(),
                ));
            }
        }

        let run = PipelineRun::pending(
            &request.source_ref,
            &request.image_tag,
            request.application,
        );
        repository::run::save(self.store.as_ref(), &run).await?;

        let notify = Arc::new(Notify::new());
        self.completions
            .lock()
            .unwrap()
            .insert(run.id, Arc::clone(&notify));
        info!(
            "Pipeline run {} submitted (ref {}, tag {})",
            run.id, run.source_ref, run.image_tag
        );

        tokio::spawn(execute(
            Arc::clone(&self.store),
            Arc::clone(&self.executor),
            Arc::clone(&self.engine),
            Arc::clone(&self.completions),
            run.clone(),
        ));
        Ok(run)
    }

    /// Fetches one run by id
    pub async fn get_run(&self, id: Uuid) -> Result<PipelineRun, PipelineError> {
        repository::run::find_by_id(self.store.as_ref(), id)
            .await?
            .ok_or(PipelineError::RunNotFound(id))
    }

    /// Waits until the run reaches a terminal outcome or the timeout
    /// expires. On timeout the run is returned as-is, still Pending.
    pub async fn await_run(
        &self,
        id: Uuid,
        timeout: Duration,
    ) -> Result<PipelineRun, PipelineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let run = self.get_run(id).await?;
            if run.is_terminal() {
                return Ok(run);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(run);
            }

            let notify = self.completions.lock().unwrap().get(&id).cloned();
            let remaining = deadline - now;
            match notify {
                Some(notify) => {
                    let _ = tokio::time::timeout(
                        remaining.min(Duration::from_millis(100)),
                        notify.notified(),
                    )
                    .await;
                }
                // Completion signal already gone; the terminal write is
                // about to land, poll for it
                None => {
                    tokio::time::sleep(
                        remaining.min(Duration::from_millis(25)),
                    )
                    .await;
                }
            }
        }
    }

    /// Lists runs in submission order, optionally for one application
    pub async fn list_runs(
        &self,
        application: Option<&str>,
    ) -> Result<Vec<PipelineRun>, PipelineError> {
        Ok(repository::run::list(self.store.as_ref(), application).await?)
    }
}

/// Runs the build and records the terminal outcome exactly once
async fn execute(
    store: Arc<dyn ObjectStore>,
    executor: Arc<dyn BuildExecutor>,
    engine: Arc<Engine>,
    completions: Arc<Mutex<HashMap<Uuid, Arc<Notify>>>>,
    run: PipelineRun,
) {
    let id = run.id;
    let result = executor.run_build(&run.source_ref, &run.image_tag).await;

    let current = match repository::run::find_by_id(store.as_ref(), id).await {
        Ok(Some(current)) => current,
        Ok(None) => {
            warn!("Pipeline run {} vanished before completion", id);
            signal_done(&completions, id);
            return;
        }
        Err(e) => {
            error!("Pipeline run {} could not be re-read: {}", id, e);
            signal_done(&completions, id);
            return;
        }
    };
    if current.is_terminal() {
        // Terminal outcomes are write-once
        warn!(
            "Pipeline run {} is already {}, keeping the recorded outcome",
            id, current.outcome
        );
        signal_done(&completions, id);
        return;
    }

    let mut finished = current;
    finished.finished_at = Some(chrono::Utc::now());
    match result {
        Ok(digest) => {
            info!("Pipeline run {} succeeded with digest {}", id, digest);
            finished.outcome = RunOutcome::Succeeded;
            finished.image_digest = Some(digest);
        }
        Err(e) => {
            warn!("Pipeline run {} failed: {}", id, e);
            finished.outcome = RunOutcome::Failed;
            finished.error_message = Some(e.to_string());
        }
    }

    match repository::run::save(store.as_ref(), &finished).await {
        Ok(()) => {
            if finished.outcome == RunOutcome::Succeeded {
                if let Some(application) = &finished.application {
                    engine.trigger_refresh(application);
                }
            }
        }
        Err(e) => {
            error!(
                "Pipeline run {} outcome could not be persisted: {}",
                id, e
            );
        }
    }
    signal_done(&completions, id);
}

fn signal_done(
    completions: &Mutex<HashMap<Uuid, Arc<Notify>>>,
    id: Uuid,
) {
    let notify = completions.lock().unwrap().remove(&id);
    if let Some(notify) = notify {
        notify.notify_waiters();
    }
}
