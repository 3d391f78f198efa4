//! Per-application worker
//!
//! Owns the reconciliation lifecycle of one application: drains the
//! trigger queue, coalesces bursts into single passes, and runs manual
//! passes ahead of background ones so operators always get a reply.
//! A fatal store error halts the worker after recording the failure;
//! later manual syncs then surface the halt to their callers.

use capstan_core::domain::application::{Application, SyncMode};
use capstan_core::domain::snapshot::{DesiredStateSnapshot, Fingerprint};
use capstan_core::domain::sync::{Health, SyncPhase};
use capstan_core::dto::sync::{SyncReport, SyncRequest};
use capstan_render::SourceRepository;
use std::sync::{Arc, RwLock};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::engine::pass::{
    self, FatalError, PassContext, PassOutcome,
};
use crate::engine::{EngineSettings, SyncTrigger};
use crate::store::{ObjectStore, WatchEvent};
use crate::util::EventQueue;

pub(crate) struct Worker {
    pub app: Application,
    pub store: Arc<dyn ObjectStore>,
    pub source: Arc<dyn SourceRepository>,
    pub settings: EngineSettings,
    pub queue: Arc<EventQueue<SyncTrigger>>,
    pub shutdown: watch::Receiver<bool>,
    /// Latest fingerprint observed for this application, shared with the
    /// source watcher; passes check it to detect being superseded
    pub latest: Arc<RwLock<Option<Fingerprint>>>,
    /// Last materialized snapshot this worker applied; the drift watcher
    /// compares live events against it
    pub cached: Arc<RwLock<Option<DesiredStateSnapshot>>>,
}

/// One drained batch of triggers, collapsed to at most one background
/// pass plus the manual passes that must each get a reply
struct Batch {
    revision: Option<Fingerprint>,
    refresh: bool,
    drift: bool,
    manuals: Vec<(SyncRequest, oneshot::Sender<SyncReport>)>,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        info!("Worker for application {} started", self.app.name);
        loop {
            tokio::select! {
                _ = self.queue.wait() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *self.shutdown.borrow() {
                break;
            }

            let batch = self.drain();
            if let Err(FatalError(message)) = self.process(batch).await {
                error!(
                    "Worker for application {} halting: {}",
                    self.app.name, message
                );
                let _ = pass::persist_failure(
                    self.store.as_ref(),
                    &self.app.name,
                    None,
                    &format!("controller halted: {message}"),
                )
                .await;
                break;
            }
        }
        debug!("Worker for application {} stopped", self.app.name);
    }

    fn drain(&self) -> Batch {
        let mut batch = Batch {
            revision: None,
            refresh: false,
            drift: false,
            manuals: Vec::new(),
        };
        for trigger in self.queue.drain() {
            match trigger {
                // Later fingerprints supersede earlier ones in the batch
                SyncTrigger::SourceChanged(fp) => batch.revision = Some(fp),
                SyncTrigger::Refresh => batch.refresh = true,
                SyncTrigger::Drift => batch.drift = true,
                SyncTrigger::Manual { request, reply } => {
                    batch.manuals.push((request, reply));
                }
            }
        }
        batch
    }

    async fn process(&self, batch: Batch) -> Result<(), FatalError> {
        for (request, reply) in batch.manuals {
            let report = self.manual_pass(request).await?;
            if reply.send(report).is_err() {
                debug!(
                    "Manual sync caller for {} went away",
                    self.app.name
                );
            }
        }

        if batch.revision.is_some() || batch.refresh {
            self.revision_pass(batch.revision).await?;
        } else if batch.drift {
            self.drift_pass().await?;
        }
        Ok(())
    }

    /// Operator-requested pass. Always produces a report; resolve and
    /// render failures become failure reports instead of silent drops.
    async fn manual_pass(
        &self,
        request: SyncRequest,
    ) -> Result<SyncReport, FatalError> {
        let dry_run = request.dry_run;
        let prune = request.prune.unwrap_or(self.app.sync_policy.prune);

        let fingerprint = match self
            .source
            .resolve(&self.app.repo_url, &self.app.target_revision)
            .await
        {
            Ok(fp) => fp,
            Err(e) => {
                let message = format!("source resolve failed: {e}");
                warn!("Manual sync for {}: {}", self.app.name, message);
                if !dry_run {
                    pass::persist_failure(
                        self.store.as_ref(),
                        &self.app.name,
                        None,
                        &message,
                    )
                    .await?;
                }
                return Ok(pass::failure_report(
                    &self.app.name,
                    None,
                    message,
                    dry_run,
                ));
            }
        };

        let snapshot = match self.render(&fingerprint).await {
            Ok(snapshot) => snapshot,
            Err(message) => {
                warn!("Manual sync for {}: {}", self.app.name, message);
                if !dry_run {
                    pass::persist_failure(
                        self.store.as_ref(),
                        &self.app.name,
                        Some(&fingerprint),
                        &message,
                    )
                    .await?;
                }
                return Ok(pass::failure_report(
                    &self.app.name,
                    Some(fingerprint),
                    message,
                    dry_run,
                ));
            }
        };

        let desired = pass::materialize(&snapshot, &self.app);
        if !dry_run {
            *self.latest.write().unwrap() = Some(fingerprint.clone());
            *self.cached.write().unwrap() = Some(DesiredStateSnapshot::new(
                fingerprint.clone(),
                desired.clone(),
            ));
        }

        match pass::run(&self.ctx(), &fingerprint, &desired, prune, dry_run)
            .await?
        {
            PassOutcome::Report(report) => Ok(report),
            PassOutcome::Superseded(reason) => Ok(SyncReport {
                application: self.app.name.clone(),
                fingerprint: Some(fingerprint),
                phase: SyncPhase::Idle,
                health: Health::Unknown,
                resources: Vec::new(),
                message: Some(format!("pass stopped: {reason}")),
                dry_run,
            }),
        }
    }

    /// Background pass for an observed or re-resolved fingerprint.
    /// Applications with a Manual sync policy only log the observation.
    async fn revision_pass(
        &self,
        revision: Option<Fingerprint>,
    ) -> Result<(), FatalError> {
        if self.app.sync_policy.mode != SyncMode::Automated {
            if let Some(fp) = revision {
                info!(
                    "Application {} observed revision {}, waiting for a manual sync",
                    self.app.name,
                    fp.short()
                );
            }
            return Ok(());
        }

        let fingerprint = match revision {
            Some(fp) => fp,
            None => match self
                .source
                .resolve(&self.app.repo_url, &self.app.target_revision)
                .await
            {
                Ok(fp) => fp,
                Err(e) => {
                    warn!(
                        "Refresh for {} could not resolve source: {}",
                        self.app.name, e
                    );
                    return Ok(());
                }
            },
        };

        let snapshot = match self.render(&fingerprint).await {
            Ok(snapshot) => snapshot,
            Err(message) => {
                warn!(
                    "Application {} cannot advance to {}: {}",
                    self.app.name,
                    fingerprint.short(),
                    message
                );
                pass::persist_failure(
                    self.store.as_ref(),
                    &self.app.name,
                    Some(&fingerprint),
                    &message,
                )
                .await?;
                return Ok(());
            }
        };

        let desired = pass::materialize(&snapshot, &self.app);
        *self.latest.write().unwrap() = Some(fingerprint.clone());
        *self.cached.write().unwrap() = Some(DesiredStateSnapshot::new(
            fingerprint.clone(),
            desired.clone(),
        ));

        let prune = self.app.sync_policy.prune;
        match pass::run(&self.ctx(), &fingerprint, &desired, prune, false)
            .await?
        {
            PassOutcome::Report(_) => {}
            PassOutcome::Superseded(reason) => debug!(
                "Pass for {} at {} stopped: {}",
                self.app.name,
                fingerprint.short(),
                reason
            ),
        }
        Ok(())
    }

    /// Self-heal pass against the last applied snapshot; no re-render
    async fn drift_pass(&self) -> Result<(), FatalError> {
        let snapshot = self.cached.read().unwrap().clone();
        let Some(snapshot) = snapshot else {
            debug!(
                "Drift signal for {} before first reconcile, ignoring",
                self.app.name
            );
            return Ok(());
        };

        debug!(
            "Self-heal pass for application {} at {}",
            self.app.name,
            snapshot.fingerprint.short()
        );
        let prune = self.app.sync_policy.prune;
        match pass::run(
            &self.ctx(),
            &snapshot.fingerprint,
            &snapshot.objects,
            prune,
            false,
        )
        .await?
        {
            PassOutcome::Report(_) => {}
            PassOutcome::Superseded(reason) => debug!(
                "Self-heal pass for {} stopped: {}",
                self.app.name, reason
            ),
        }
        Ok(())
    }

    async fn render(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<DesiredStateSnapshot, String> {
        capstan_render::render(
            self.source.as_ref(),
            &self.app.repo_url,
            fingerprint,
            &self.app.path,
        )
        .await
        .map_err(|e| format!("render failed: {e}"))
    }

    fn ctx(&self) -> PassContext<'_> {
        PassContext {
            app: &self.app,
            store: self.store.as_ref(),
            settings: &self.settings,
            shutdown: &self.shutdown,
            latest: &self.latest,
        }
    }
}

/// Watches the destination namespace and turns events on owned objects
/// into drift triggers.
///
/// Signals only once a baseline snapshot exists. Convergence is safe
/// because applying an identical payload emits no watch event, so a
/// drift pass that finds everything in place goes quiet.
pub(crate) async fn drift_watch(
    application: String,
    namespace: String,
    store: Arc<dyn ObjectStore>,
    cached: Arc<RwLock<Option<DesiredStateSnapshot>>>,
    queue: Arc<EventQueue<SyncTrigger>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut subscription = store.watch(&namespace).await;
    debug!(
        "Drift watch for application {} on namespace {}",
        application, namespace
    );

    loop {
        let event = tokio::select! {
            event = subscription.next() => match event {
                Some(event) => event,
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        if cached.read().unwrap().is_none() {
            continue;
        }

        match event {
            WatchEvent::Overflowed => {
                warn!(
                    "Drift watch for application {} lagged, forcing a pass",
                    application
                );
                queue.push(SyncTrigger::Drift);
            }
            event => {
                let Some(obj) = event.object() else { continue };
                if obj.owner() == Some(application.as_str()) {
                    debug!(
                        "Drift detected on {} for application {}",
                        obj.key, application
                    );
                    queue.push(SyncTrigger::Drift);
                }
            }
        }
    }
    debug!("Drift watch for application {} stopped", application);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::repository;
    use crate::store::MemoryStore;
    use capstan_core::domain::application::SyncPolicy;
    use capstan_core::domain::object::{ManifestObject, ObjectKey};
    use capstan_core::domain::sync::ResourceAction;
    use capstan_render::FixtureRepository;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    const DEPLOYMENT: &str = "kind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 2\n";
    const SERVICE: &str = "kind: Service\nmetadata:\n  name: web\nspec:\n  port: 80\n";

    fn test_settings() -> EngineSettings {
        EngineSettings {
            poll_interval: Duration::from_millis(25),
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
            ..EngineSettings::default()
        }
    }

    fn app(policy: SyncPolicy) -> Application {
        Application {
            name: "shop".to_string(),
            repo_url: "https://git.example/shop.git".to_string(),
            path: "".to_string(),
            target_revision: "main".to_string(),
            dest_namespace: "demo".to_string(),
            sync_policy: policy,
            created_at: chrono::Utc::now(),
        }
    }

    async fn eventually<F>(what: &str, mut check: F)
    where
        F: AsyncFnMut() -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if check().await {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_manual_sync_applies_and_reports() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("deployment.yaml", DEPLOYMENT), ("service.yaml", SERVICE)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(app(SyncPolicy::default()));

        let report = engine
            .trigger_manual("shop", SyncRequest::default())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.phase, SyncPhase::Settled);
        assert_eq!(report.resources.len(), 2);
        assert!(
            report
                .resources
                .iter()
                .all(|r| r.action == ResourceAction::Created)
        );

        let live = store
            .get(&ObjectKey::new("Deployment", "demo", "web"))
            .await
            .unwrap();
        assert_eq!(live.owner(), Some("shop"));
        assert_eq!(live.spec["spec"]["replicas"], json!(2));
    }

    #[tokio::test]
    async fn test_dry_run_previews_without_applying() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("service.yaml", SERVICE)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(app(SyncPolicy::default()));

        let report = engine
            .trigger_manual(
                "shop",
                SyncRequest {
                    prune: None,
                    dry_run: true,
                },
            )
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.resources.len(), 1);
        assert!(
            store
                .get(&ObjectKey::new("Service", "demo", "web"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_automated_policy_follows_source_changes() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("service.yaml", SERVICE)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(app(SyncPolicy {
            mode: SyncMode::Automated,
            self_heal: false,
            prune: true,
        }));

        let key = ObjectKey::new("Service", "demo", "web");
        eventually("first automated apply", async || {
            store.get(&key).await.is_ok()
        })
        .await;

        // Push a new revision; the poller should pick it up and reconcile
        source.push(
            "https://git.example/shop.git",
            "main",
            &[(
                "service.yaml",
                "kind: Service\nmetadata:\n  name: web\nspec:\n  port: 9090\n",
            )],
        );
        eventually("updated spec to land", async || {
            match store.get(&key).await {
                Ok(live) => live.spec["spec"]["port"] == json!(9090),
                Err(_) => false,
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_self_heal_reverts_out_of_band_edits() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("service.yaml", SERVICE)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(app(SyncPolicy {
            mode: SyncMode::Automated,
            self_heal: true,
            prune: false,
        }));

        let key = ObjectKey::new("Service", "demo", "web");
        eventually("initial apply", async || store.get(&key).await.is_ok())
            .await;

        // Out-of-band edit: someone bumps the port directly in the store
        let live = store.get(&key).await.unwrap();
        let mut tampered = ManifestObject::new(key.clone(), json!({"spec": {"port": 1234}}));
        tampered.labels = live.labels.clone();
        store
            .apply(tampered, Some(live.resource_version))
            .await
            .unwrap();

        eventually("self-heal to revert the edit", async || {
            match store.get(&key).await {
                Ok(live) => live.spec["spec"]["port"] == json!(80),
                Err(_) => false,
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_readiness_reports_flow_into_health() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("deployment.yaml", DEPLOYMENT)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(app(SyncPolicy {
            mode: SyncMode::Automated,
            self_heal: true,
            prune: false,
        }));

        let key = ObjectKey::new("Deployment", "demo", "web");
        eventually("deployment to be applied", async || {
            store.get(&key).await.is_ok()
        })
        .await;
        eventually("status to report Progressing", async || {
            match repository::status::find_by_application(
                store.as_ref(),
                "shop",
            )
            .await
            {
                Ok(Some(status)) => status.health == Health::Progressing,
                _ => false,
            }
        })
        .await;

        // The workload comes up; its readiness lands via the status channel
        store
            .update_status(&key, json!({"readyReplicas": 2}))
            .await
            .unwrap();

        eventually("health to become Healthy", async || {
            match repository::status::find_by_application(
                store.as_ref(),
                "shop",
            )
            .await
            {
                Ok(Some(status)) => status.health == Health::Healthy,
                _ => false,
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_first_pass_creates_workload_then_exposure() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/demo.git",
            "main",
            &[
                (
                    "deployment.yaml",
                    "kind: Deployment\nmetadata:\n  name: demo-app\nspec:\n  replicas: 1\n",
                ),
                (
                    "route.yaml",
                    "kind: Route\nmetadata:\n  name: demo-app\nspec:\n  host: demo.example\n",
                ),
                (
                    "service.yaml",
                    "kind: Service\nmetadata:\n  name: demo-app\nspec:\n  port: 80\n",
                ),
            ],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        engine.spawn(Application {
            name: "demo-app".to_string(),
            repo_url: "https://git.example/demo.git".to_string(),
            path: "".to_string(),
            target_revision: "main".to_string(),
            dest_namespace: "demo".to_string(),
            sync_policy: SyncPolicy {
                mode: SyncMode::Manual,
                self_heal: true,
                prune: false,
            },
            created_at: chrono::Utc::now(),
        });

        let report = engine
            .trigger_manual("demo-app", SyncRequest::default())
            .await
            .unwrap();

        // Workload before network exposure; ties inside a wave break by
        // kind then name
        let kinds: Vec<&str> = report
            .resources
            .iter()
            .map(|r| r.key.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["Deployment", "Route", "Service"]);
        assert!(
            report
                .resources
                .iter()
                .all(|r| r.action == ResourceAction::Created)
        );
        assert_eq!(report.health, Health::Progressing);

        // The deployment comes up; health follows on the next pass
        store
            .update_status(
                &ObjectKey::new("Deployment", "demo", "demo-app"),
                json!({"readyReplicas": 1}),
            )
            .await
            .unwrap();

        eventually("health to become Healthy", async || {
            match repository::status::find_by_application(
                store.as_ref(),
                "demo-app",
            )
            .await
            {
                Ok(Some(status)) => status.health == Health::Healthy,
                _ => false,
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_remove_with_cascade_deletes_owned_objects() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        source.push(
            "https://git.example/shop.git",
            "main",
            &[("deployment.yaml", DEPLOYMENT), ("service.yaml", SERVICE)],
        );
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            test_settings(),
        );
        let application = app(SyncPolicy::default());
        engine.spawn(application.clone());
        engine
            .trigger_manual("shop", SyncRequest::default())
            .await
            .unwrap();

        engine.remove(&application, true).await.unwrap();

        assert!(!engine.is_tracked("shop"));
        let remaining = store.list("demo", None).await.unwrap();
        assert!(remaining.is_empty());
    }
}
