//! Reconciliation engine
//!
//! One worker task per tracked application owns that application's
//! diff/apply cycle end to end; a source watcher and an optional drift
//! watcher feed it triggers through a bounded queue. Workers never share
//! state, so one application backing off or failing never stalls another.

pub mod diff;
pub mod health;
pub mod pass;
pub mod worker;

use capstan_core::domain::application::Application;
use capstan_core::domain::object::OWNER_LABEL;
use capstan_core::domain::snapshot::Fingerprint;
use capstan_core::dto::sync::{SyncReport, SyncRequest};
use capstan_core::error::StoreError;
use capstan_render::SourceRepository;
use capstan_render::order::apply_wave;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::source::watcher::SourceWatcher;
use crate::store::ObjectStore;
use crate::util::EventQueue;

/// Work item delivered to an application worker
pub enum SyncTrigger {
    /// The watched source moved to a new fingerprint
    SourceChanged(Fingerprint),
    /// Re-resolve and reconcile regardless of the last seen fingerprint
    Refresh,
    /// An owned live object diverged from the last applied snapshot
    Drift,
    /// Operator-requested pass; the reply channel receives the report
    Manual {
        request: SyncRequest,
        reply: oneshot::Sender<SyncReport>,
    },
}

/// Tunables shared by every worker
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Apply attempts per object before it is marked Failed
    pub max_object_retries: u32,
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(180),
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            max_object_retries: 5,
            queue_capacity: 64,
        }
    }
}

/// Engine-level failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("application {0} is not tracked")]
    NotTracked(String),
    /// The worker stopped on a fatal error and dropped the reply
    #[error("worker for application {0} has halted")]
    Halted(String),
}

struct WorkerHandle {
    queue: Arc<EventQueue<SyncTrigger>>,
    shutdown: watch::Sender<bool>,
}

/// Tracks applications and owns their worker tasks
pub struct Engine {
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn SourceRepository>,
    settings: EngineSettings,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: Arc<dyn SourceRepository>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Starts tracking an application: worker, source watcher and (when
    /// self-heal is on) drift watcher. Idempotent per name.
    pub fn spawn(&self, app: Application) {
        let mut workers = self.workers.lock().unwrap();
        if workers.contains_key(&app.name) {
            return;
        }

        let queue = Arc::new(EventQueue::new(self.settings.queue_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let latest: Arc<RwLock<Option<Fingerprint>>> =
            Arc::new(RwLock::new(None));
        let cached = Arc::new(RwLock::new(None));

        let watcher = SourceWatcher::new(
            &app,
            Arc::clone(&self.source),
            Arc::clone(&queue),
            Arc::clone(&latest),
            shutdown_rx.clone(),
            &self.settings,
        );
        tokio::spawn(watcher.run());

        if app.sync_policy.self_heal {
            tokio::spawn(worker::drift_watch(
                app.name.clone(),
                app.dest_namespace.clone(),
                Arc::clone(&self.store),
                Arc::clone(&cached),
                Arc::clone(&queue),
                shutdown_rx.clone(),
            ));
        }

        let name = app.name.clone();
        let worker = worker::Worker {
            app,
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            settings: self.settings.clone(),
            queue: Arc::clone(&queue),
            shutdown: shutdown_rx,
            latest,
            cached,
        };
        tokio::spawn(worker.run());

        workers.insert(
            name.clone(),
            WorkerHandle {
                queue,
                shutdown: shutdown_tx,
            },
        );
        info!("Engine now tracking application {}", name);
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.workers.lock().unwrap().contains_key(name)
    }

    /// Stops tracking an application. With cascade the objects it owns are
    /// deleted from the store, dependents before dependencies.
    pub async fn remove(
        &self,
        app: &Application,
        cascade: bool,
    ) -> Result<(), StoreError> {
        let handle = self.workers.lock().unwrap().remove(&app.name);
        match handle {
            Some(handle) => {
                let _ = handle.shutdown.send(true);
                info!("Engine stopped tracking application {}", app.name);
            }
            None => debug!("Application {} was not tracked", app.name),
        }

        if cascade {
            self.prune_owned(app).await?;
        }
        Ok(())
    }

    /// Runs one operator-requested pass and waits for its report
    pub async fn trigger_manual(
        &self,
        name: &str,
        request: SyncRequest,
    ) -> Result<SyncReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        {
            let workers = self.workers.lock().unwrap();
            let handle = workers
                .get(name)
                .ok_or_else(|| EngineError::NotTracked(name.to_string()))?;
            handle.queue.push(SyncTrigger::Manual { request, reply });
        }
        rx.await.map_err(|_| EngineError::Halted(name.to_string()))
    }

    /// Asks an application's worker to re-resolve and reconcile; used when
    /// a linked pipeline run succeeds
    pub fn trigger_refresh(&self, name: &str) {
        let workers = self.workers.lock().unwrap();
        match workers.get(name) {
            Some(handle) => handle.queue.push(SyncTrigger::Refresh),
            None => debug!("Refresh for untracked application {}", name),
        }
    }

    /// Deletes every live object owned by the application, in reverse
    /// apply order
    async fn prune_owned(&self, app: &Application) -> Result<(), StoreError> {
        let mut owned = self
            .store
            .list(&app.dest_namespace, Some((OWNER_LABEL, &app.name)))
            .await?;
        owned.sort_by(|a, b| {
            apply_wave(&b.key.kind)
                .cmp(&apply_wave(&a.key.kind))
                .then_with(|| b.key.cmp(&a.key))
        });

        let total = owned.len();
        for obj in owned {
            let mut expected = obj.resource_version;
            let mut attempt = 0;
            loop {
                match self.store.delete(&obj.key, expected).await {
                    Ok(()) => break,
                    Err(e) if e.is_not_found() => break,
                    Err(StoreError::Conflict { .. }) if attempt < 3 => {
                        attempt += 1;
                        match self.store.get(&obj.key).await {
                            Ok(live) => expected = live.resource_version,
                            Err(e) if e.is_not_found() => break,
                            Err(e) => return Err(e),
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Cascade delete of {} failed: {}",
                            obj.key, e
                        );
                        return Err(e);
                    }
                }
            }
        }
        info!(
            "Cascade removed {} owned objects for application {}",
            total, app.name
        );
        Ok(())
    }
}
