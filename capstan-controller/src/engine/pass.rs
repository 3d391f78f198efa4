//! Reconciliation pass
//!
//! One diff/apply cycle for one application: list owned live objects,
//! compute the plan, apply in wave order under optimistic concurrency,
//! prune (or report) orphans, classify health, and persist the status.
//!
//! Conflicts retry per object: one immediate re-read-and-retry, then
//! backoff rounds surfaced as the ConflictRetry phase, bounded by the
//! per-object budget. Exhausting the budget fails that object only; the
//! pass continues and the application degrades instead of wedging.
//!
//! At every step boundary the pass checks whether a newer fingerprint or
//! an application delete superseded it, and stops cleanly without writing
//! status if so.

use capstan_core::domain::application::Application;
use capstan_core::domain::object::{LiveObject, ManifestObject, OWNER_LABEL};
use capstan_core::domain::snapshot::{DesiredStateSnapshot, Fingerprint};
use capstan_core::domain::sync::{
    Health, ResourceAction, ResourceOutcome, SyncPhase, SyncStatus,
};
use capstan_core::dto::sync::SyncReport;
use capstan_core::error::StoreError;
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::diff::{self, PlannedAction};
use crate::engine::{EngineSettings, health};
use crate::repository;
use crate::store::ObjectStore;
use crate::util::Backoff;

/// Everything a pass needs from its worker
pub(crate) struct PassContext<'a> {
    pub app: &'a Application,
    pub store: &'a dyn ObjectStore,
    pub settings: &'a EngineSettings,
    pub shutdown: &'a watch::Receiver<bool>,
    /// Latest fingerprint observed for this application; a mismatch with
    /// the pass fingerprint supersedes the pass
    pub latest: &'a RwLock<Option<Fingerprint>>,
}

/// How a pass ended
pub(crate) enum PassOutcome {
    Report(SyncReport),
    /// Stopped cleanly at a step boundary; no status was written
    Superseded(&'static str),
}

/// Store failure that must halt the application's worker
pub(crate) struct FatalError(pub String);

enum StepError {
    Fatal(String),
    Exhausted(String),
}

/// Projects a rendered snapshot onto an application: destination-namespace
/// defaulting and ownership labeling
pub(crate) fn materialize(
    snapshot: &DesiredStateSnapshot,
    app: &Application,
) -> Vec<ManifestObject> {
    snapshot
        .objects
        .iter()
        .map(|obj| {
            let mut obj = obj.clone();
            if obj.key.namespace.is_empty() {
                obj.key.namespace = app.dest_namespace.clone();
            }
            obj.with_owner(&app.name)
        })
        .collect()
}

/// Runs one reconciliation pass over materialized desired objects
pub(crate) async fn run(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
    desired: &[ManifestObject],
    prune: bool,
    dry_run: bool,
) -> Result<PassOutcome, FatalError> {
    if let Some(reason) = cancelled(ctx, fingerprint) {
        return Ok(PassOutcome::Superseded(reason));
    }
    debug!(
        "Reconciling application {} at {} ({} desired objects, prune: {}, dry run: {})",
        ctx.app.name,
        fingerprint.short(),
        desired.len(),
        prune,
        dry_run
    );

    if !dry_run {
        write_phase(ctx, fingerprint, SyncPhase::Diffing).await?;
    }

    let live = match list_owned(ctx).await {
        Ok(live) => live,
        Err(StepError::Fatal(message)) => return Err(FatalError(message)),
        Err(StepError::Exhausted(message)) => {
            warn!(
                "Pass for application {} gave up listing live state: {}",
                ctx.app.name, message
            );
            if !dry_run {
                persist_failure(
                    ctx.store,
                    &ctx.app.name,
                    Some(fingerprint),
                    &message,
                )
                .await?;
            }
            return Ok(PassOutcome::Report(failure_report(
                &ctx.app.name,
                Some(fingerprint.clone()),
                message,
                dry_run,
            )));
        }
    };

    let plan = diff::diff(desired, &live);
    if dry_run {
        return Ok(PassOutcome::Report(dry_run_report(
            ctx, fingerprint, &plan, prune,
        )));
    }

    if !plan.is_converged() {
        write_phase(ctx, fingerprint, SyncPhase::Applying).await?;
    }

    let mut outcomes: Vec<ResourceOutcome> = Vec::new();
    for obj in desired {
        match plan.action_for(&obj.key) {
            None => outcomes.push(ResourceOutcome::new(
                obj.key.clone(),
                ResourceAction::Unchanged,
            )),
            Some(action) => {
                if let Some(reason) = cancelled(ctx, fingerprint) {
                    return Ok(PassOutcome::Superseded(reason));
                }
                outcomes.push(apply_object(ctx, fingerprint, obj, action).await?);
            }
        }
    }

    for orphan in &plan.to_prune {
        if let Some(reason) = cancelled(ctx, fingerprint) {
            return Ok(PassOutcome::Superseded(reason));
        }
        if prune {
            outcomes.push(prune_object(ctx, fingerprint, orphan).await?);
        } else {
            debug!("Leaving orphaned {} in place, prune disabled", orphan.key);
            outcomes.push(
                ResourceOutcome::new(
                    orphan.key.clone(),
                    ResourceAction::PruneSkipped,
                )
                .with_message("orphaned object left in place; prune disabled"),
            );
        }
    }

    let failures: Vec<String> = outcomes
        .iter()
        .filter(|outcome| outcome.action == ResourceAction::Failed)
        .map(|outcome| match &outcome.message {
            Some(message) => format!("{}: {}", outcome.key, message),
            None => outcome.key.to_string(),
        })
        .collect();
    let failed = !failures.is_empty();
    let last_error = if failed {
        Some(failures.join("; "))
    } else {
        None
    };

    let health = match list_owned(ctx).await {
        Ok(owned) => health::classify(&outcomes, &owned),
        Err(StepError::Fatal(message)) => return Err(FatalError(message)),
        Err(StepError::Exhausted(message)) => {
            warn!(
                "Health check for application {} could not list live state: {}",
                ctx.app.name, message
            );
            if failed { Health::Degraded } else { Health::Progressing }
        }
    };
    let phase = if failed {
        SyncPhase::Failed
    } else {
        SyncPhase::Settled
    };

    // Last-fingerprint-wins: a superseded pass completes without a status
    // write, leaving the record to the pass that owns the newer revision
    if let Some(reason) = cancelled(ctx, fingerprint) {
        return Ok(PassOutcome::Superseded(reason));
    }

    let mut status = load_status(ctx.store, &ctx.app.name).await?;
    status.phase = phase;
    status.health = health;
    status.last_attempted = Some(fingerprint.clone());
    if !failed {
        status.last_synced = Some(fingerprint.clone());
    }
    status.resources = outcomes.clone();
    status.last_error = last_error.clone();
    status.observed_at = chrono::Utc::now();
    store_status(ctx.store, &status).await?;

    info!(
        "Application {} reconciled at {}: phase {}, health {}",
        ctx.app.name,
        fingerprint.short(),
        phase,
        health
    );

    Ok(PassOutcome::Report(SyncReport {
        application: ctx.app.name.clone(),
        fingerprint: Some(fingerprint.clone()),
        phase,
        health,
        resources: outcomes,
        message: last_error,
        dry_run: false,
    }))
}

/// A report for a pass that aborted before touching live objects
pub(crate) fn failure_report(
    application: &str,
    fingerprint: Option<Fingerprint>,
    message: String,
    dry_run: bool,
) -> SyncReport {
    SyncReport {
        application: application.to_string(),
        fingerprint,
        phase: SyncPhase::Failed,
        health: Health::Degraded,
        resources: Vec::new(),
        message: Some(message),
        dry_run,
    }
}

/// Records a pass-aborting error in the persisted status
pub(crate) async fn persist_failure(
    store: &dyn ObjectStore,
    application: &str,
    fingerprint: Option<&Fingerprint>,
    message: &str,
) -> Result<(), FatalError> {
    let mut status = load_status(store, application).await?;
    status.phase = SyncPhase::Failed;
    status.health = Health::Degraded;
    if let Some(fingerprint) = fingerprint {
        status.last_attempted = Some(fingerprint.clone());
    }
    status.last_error = Some(message.to_string());
    status.observed_at = chrono::Utc::now();
    store_status(store, &status).await
}

fn cancelled(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
) -> Option<&'static str> {
    if *ctx.shutdown.borrow() {
        return Some("application deleted");
    }
    if let Some(latest) = ctx.latest.read().unwrap().as_ref() {
        if latest != fingerprint {
            return Some("superseded by a newer revision");
        }
    }
    None
}

async fn list_owned(
    ctx: &PassContext<'_>,
) -> Result<Vec<LiveObject>, StepError> {
    let mut backoff =
        Backoff::new(ctx.settings.backoff_base, ctx.settings.backoff_cap);
    let mut last_error = String::new();
    for _ in 0..ctx.settings.max_object_retries.max(1) {
        match ctx
            .store
            .list(&ctx.app.dest_namespace, Some((OWNER_LABEL, &ctx.app.name)))
            .await
        {
            Ok(live) => return Ok(live),
            Err(StoreError::Fatal(message)) => {
                return Err(StepError::Fatal(message));
            }
            Err(e) if e.is_retryable() => {
                last_error = e.to_string();
                tokio::time::sleep(backoff.next_delay()).await;
            }
            Err(e) => return Err(StepError::Exhausted(e.to_string())),
        }
    }
    Err(StepError::Exhausted(format!(
        "listing live objects kept failing: {last_error}"
    )))
}

/// Applies one object with the per-object conflict budget.
///
/// First conflict: immediate re-read and retry. Later conflicts: backoff
/// rounds surfaced as ConflictRetry. A re-read showing the live object
/// already matches counts as converged, not drift.
async fn apply_object(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
    desired: &ManifestObject,
    action: PlannedAction,
) -> Result<ResourceOutcome, FatalError> {
    let mut expected = match action {
        PlannedAction::Create => None,
        PlannedAction::Update { current_version } => Some(current_version),
    };
    let mut backoff =
        Backoff::new(ctx.settings.backoff_base, ctx.settings.backoff_cap);
    let mut immediate_retry = true;
    let mut last_error = String::new();
    let budget = ctx.settings.max_object_retries.max(1);

    for attempt in 1..=budget {
        match ctx.store.apply(desired.clone(), expected).await {
            Ok(_) => {
                let action = if expected.is_none() {
                    ResourceAction::Created
                } else {
                    ResourceAction::Updated
                };
                debug!("{} {}", action, desired.key);
                return Ok(ResourceOutcome::new(desired.key.clone(), action));
            }
            Err(StoreError::Conflict { actual, .. }) => {
                last_error = format!(
                    "version conflict, live object moved to version {actual}"
                );
                if attempt == budget {
                    break;
                }
                if immediate_retry {
                    immediate_retry = false;
                } else {
                    write_phase(ctx, fingerprint, SyncPhase::ConflictRetry)
                        .await?;
                    tokio::time::sleep(backoff.next_delay()).await;
                    write_phase(ctx, fingerprint, SyncPhase::Applying).await?;
                }
                match ctx.store.get(&desired.key).await {
                    Ok(live) => {
                        if diff::semantic_eq(desired, &live) {
                            return Ok(ResourceOutcome::new(
                                desired.key.clone(),
                                ResourceAction::Unchanged,
                            ));
                        }
                        expected = Some(live.resource_version);
                    }
                    Err(e) if e.is_not_found() => expected = None,
                    Err(StoreError::Fatal(message)) => {
                        return Err(FatalError(message));
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }
            Err(StoreError::Transient(message)) => {
                last_error = message;
                if attempt == budget {
                    break;
                }
                tokio::time::sleep(backoff.next_delay()).await;
            }
            Err(StoreError::Validation(message)) => {
                warn!("Apply of {} rejected: {}", desired.key, message);
                return Ok(ResourceOutcome::new(
                    desired.key.clone(),
                    ResourceAction::Failed,
                )
                .with_message(message));
            }
            Err(StoreError::NotFound(_)) => expected = None,
            Err(StoreError::Fatal(message)) => return Err(FatalError(message)),
        }
    }

    warn!(
        "Apply of {} for application {} exhausted {} attempts: {}",
        desired.key, ctx.app.name, budget, last_error
    );
    Ok(
        ResourceOutcome::new(desired.key.clone(), ResourceAction::Failed)
            .with_message(format!("retries exhausted: {last_error}")),
    )
}

/// Deletes one orphan under the same conflict budget as applies
async fn prune_object(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
    orphan: &LiveObject,
) -> Result<ResourceOutcome, FatalError> {
    let mut expected = orphan.resource_version;
    let mut backoff =
        Backoff::new(ctx.settings.backoff_base, ctx.settings.backoff_cap);
    let mut immediate_retry = true;
    let mut last_error = String::new();
    let budget = ctx.settings.max_object_retries.max(1);

    for attempt in 1..=budget {
        match ctx.store.delete(&orphan.key, expected).await {
            Ok(()) => {
                info!("Pruned {}", orphan.key);
                return Ok(ResourceOutcome::new(
                    orphan.key.clone(),
                    ResourceAction::Pruned,
                ));
            }
            Err(StoreError::NotFound(_)) => {
                return Ok(ResourceOutcome::new(
                    orphan.key.clone(),
                    ResourceAction::Pruned,
                )
                .with_message("already deleted"));
            }
            Err(StoreError::Conflict { .. }) => {
                last_error = "version conflict while pruning".to_string();
                if attempt == budget {
                    break;
                }
                if immediate_retry {
                    immediate_retry = false;
                } else {
                    write_phase(ctx, fingerprint, SyncPhase::ConflictRetry)
                        .await?;
                    tokio::time::sleep(backoff.next_delay()).await;
                    write_phase(ctx, fingerprint, SyncPhase::Applying).await?;
                }
                match ctx.store.get(&orphan.key).await {
                    Ok(live) => expected = live.resource_version,
                    Err(e) if e.is_not_found() => {
                        return Ok(ResourceOutcome::new(
                            orphan.key.clone(),
                            ResourceAction::Pruned,
                        )
                        .with_message("already deleted"));
                    }
                    Err(StoreError::Fatal(message)) => {
                        return Err(FatalError(message));
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }
            Err(StoreError::Transient(message)) => {
                last_error = message;
                if attempt == budget {
                    break;
                }
                tokio::time::sleep(backoff.next_delay()).await;
            }
            Err(StoreError::Validation(message)) => {
                return Ok(ResourceOutcome::new(
                    orphan.key.clone(),
                    ResourceAction::Failed,
                )
                .with_message(message));
            }
            Err(StoreError::Fatal(message)) => return Err(FatalError(message)),
        }
    }

    warn!(
        "Prune of {} exhausted {} attempts: {}",
        orphan.key, budget, last_error
    );
    Ok(
        ResourceOutcome::new(orphan.key.clone(), ResourceAction::Failed)
            .with_message(format!("prune retries exhausted: {last_error}")),
    )
}

fn dry_run_report(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
    plan: &diff::DiffPlan,
    prune: bool,
) -> SyncReport {
    let mut resources = Vec::new();
    for key in &plan.to_create {
        resources.push(
            ResourceOutcome::new(key.clone(), ResourceAction::Created)
                .with_message("dry run"),
        );
    }
    for key in &plan.to_update {
        resources.push(
            ResourceOutcome::new(key.clone(), ResourceAction::Updated)
                .with_message("dry run"),
        );
    }
    for orphan in &plan.to_prune {
        let action = if prune {
            ResourceAction::Pruned
        } else {
            ResourceAction::PruneSkipped
        };
        resources.push(
            ResourceOutcome::new(orphan.key.clone(), action)
                .with_message("dry run"),
        );
    }
    for key in &plan.unchanged {
        resources
            .push(ResourceOutcome::new(key.clone(), ResourceAction::Unchanged));
    }

    SyncReport {
        application: ctx.app.name.clone(),
        fingerprint: Some(fingerprint.clone()),
        phase: SyncPhase::Idle,
        health: Health::Unknown,
        resources,
        message: Some(format!(
            "dry run: {} to create, {} to update, {} to prune",
            plan.to_create.len(),
            plan.to_update.len(),
            plan.to_prune.len()
        )),
        dry_run: true,
    }
}

async fn write_phase(
    ctx: &PassContext<'_>,
    fingerprint: &Fingerprint,
    phase: SyncPhase,
) -> Result<(), FatalError> {
    let mut status = load_status(ctx.store, &ctx.app.name).await?;
    status.phase = phase;
    status.last_attempted = Some(fingerprint.clone());
    status.observed_at = chrono::Utc::now();
    store_status(ctx.store, &status).await
}

/// Loads the persisted status, tolerating everything except fatal store
/// failures; phase bookkeeping must not wedge a pass
async fn load_status(
    store: &dyn ObjectStore,
    application: &str,
) -> Result<SyncStatus, FatalError> {
    match repository::status::find_by_application(store, application).await {
        Ok(Some(status)) => Ok(status),
        Ok(None) => Ok(SyncStatus::unknown(application)),
        Err(StoreError::Fatal(message)) => Err(FatalError(message)),
        Err(e) => {
            warn!("Could not load sync status for {}: {}", application, e);
            Ok(SyncStatus::unknown(application))
        }
    }
}

async fn store_status(
    store: &dyn ObjectStore,
    status: &SyncStatus,
) -> Result<(), FatalError> {
    match repository::status::save(store, status).await {
        Ok(()) => Ok(()),
        Err(StoreError::Fatal(message)) => Err(FatalError(message)),
        Err(e) => {
            warn!(
                "Sync status write for {} failed: {}",
                status.application, e
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WatchSubscription};
    use async_trait::async_trait;
    use capstan_core::domain::application::SyncPolicy;
    use capstan_core::domain::object::ObjectKey;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn demo_app() -> Application {
        Application {
            name: "shop".to_string(),
            repo_url: "repo".to_string(),
            path: "".to_string(),
            target_revision: "main".to_string(),
            dest_namespace: "demo".to_string(),
            sync_policy: SyncPolicy::default(),
            created_at: chrono::Utc::now(),
        }
    }

    fn fast_settings() -> EngineSettings {
        EngineSettings {
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
            ..EngineSettings::default()
        }
    }

    fn desired_objects() -> Vec<ManifestObject> {
        let snapshot = DesiredStateSnapshot::new(
            Fingerprint::new("rev-1"),
            vec![
                ManifestObject::new(
                    ObjectKey::new("ConfigMap", "", "web-config"),
                    json!({"data": {"greeting": "hello"}}),
                ),
                ManifestObject::new(
                    ObjectKey::new("Service", "", "web"),
                    json!({"spec": {"port": 80}}),
                ),
            ],
        );
        materialize(&snapshot, &demo_app())
    }

    struct Harness {
        app: Application,
        settings: EngineSettings,
        shutdown: tokio::sync::watch::Receiver<bool>,
        _shutdown_tx: tokio::sync::watch::Sender<bool>,
        latest: RwLock<Option<Fingerprint>>,
    }

    impl Harness {
        fn new(fingerprint: &Fingerprint) -> Self {
            let (tx, rx) = tokio::sync::watch::channel(false);
            Self {
                app: demo_app(),
                settings: fast_settings(),
                shutdown: rx,
                _shutdown_tx: tx,
                latest: RwLock::new(Some(fingerprint.clone())),
            }
        }

        fn ctx<'a>(&'a self, store: &'a dyn ObjectStore) -> PassContext<'a> {
            PassContext {
                app: &self.app,
                store,
                settings: &self.settings,
                shutdown: &self.shutdown,
                latest: &self.latest,
            }
        }
    }

    fn report(outcome: PassOutcome) -> SyncReport {
        match outcome {
            PassOutcome::Report(report) => report,
            PassOutcome::Superseded(reason) => {
                panic!("pass unexpectedly superseded: {reason}")
            }
        }
    }

    #[tokio::test]
    async fn test_first_pass_creates_everything_and_settles() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();

        let outcome = run(&harness.ctx(&store), &fingerprint, &desired, false, false)
            .await
            .unwrap_or_else(|FatalError(m)| panic!("fatal: {m}"));
        let report = report(outcome);

        assert_eq!(report.phase, SyncPhase::Settled);
        assert_eq!(report.health, Health::Healthy);
        assert!(report.resources.iter().all(|r| r.action == ResourceAction::Created));

        let live = store
            .get(&ObjectKey::new("Service", "demo", "web"))
            .await
            .unwrap();
        assert_eq!(live.owner(), Some("shop"));

        let status =
            repository::status::find_by_application(&store, "shop")
                .await
                .unwrap()
                .unwrap();
        assert_eq!(status.phase, SyncPhase::Settled);
        assert_eq!(status.last_synced, Some(fingerprint));
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();

        let ctx = harness.ctx(&store);
        report(run(&ctx, &fingerprint, &desired, false, false).await.ok().unwrap());
        let service_version = store
            .get(&ObjectKey::new("Service", "demo", "web"))
            .await
            .unwrap()
            .resource_version;

        let second =
            report(run(&ctx, &fingerprint, &desired, false, false).await.ok().unwrap());
        assert!(
            second
                .resources
                .iter()
                .all(|r| r.action == ResourceAction::Unchanged)
        );
        let after = store
            .get(&ObjectKey::new("Service", "demo", "web"))
            .await
            .unwrap()
            .resource_version;
        assert_eq!(service_version, after);
    }

    #[tokio::test]
    async fn test_spec_change_updates_only_that_object() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let mut desired = desired_objects();

        let ctx = harness.ctx(&store);
        report(run(&ctx, &fingerprint, &desired, false, false).await.ok().unwrap());

        desired[1].spec = json!({"spec": {"port": 8080}});
        let second =
            report(run(&ctx, &fingerprint, &desired, false, false).await.ok().unwrap());

        let actions: HashMap<String, ResourceAction> = second
            .resources
            .iter()
            .map(|r| (r.key.name.clone(), r.action))
            .collect();
        assert_eq!(actions["web-config"], ResourceAction::Unchanged);
        assert_eq!(actions["web"], ResourceAction::Updated);
    }

    #[tokio::test]
    async fn test_prune_respects_policy_and_override() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();

        let ctx = harness.ctx(&store);
        report(run(&ctx, &fingerprint, &desired, false, false).await.ok().unwrap());

        // New revision no longer declares the config map
        let shrunk = vec![desired[1].clone()];
        let skipped =
            report(run(&ctx, &fingerprint, &shrunk, false, false).await.ok().unwrap());
        assert!(
            skipped
                .resources
                .iter()
                .any(|r| r.action == ResourceAction::PruneSkipped)
        );
        assert_eq!(skipped.health, Health::Progressing);
        assert!(
            store
                .get(&ObjectKey::new("ConfigMap", "demo", "web-config"))
                .await
                .is_ok()
        );

        let pruned =
            report(run(&ctx, &fingerprint, &shrunk, true, false).await.ok().unwrap());
        assert!(
            pruned
                .resources
                .iter()
                .any(|r| r.action == ResourceAction::Pruned)
        );
        assert_eq!(pruned.health, Health::Healthy);
        assert!(
            store
                .get(&ObjectKey::new("ConfigMap", "demo", "web-config"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_dry_run_reports_plan_without_touching_anything() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();

        let outcome = run(&harness.ctx(&store), &fingerprint, &desired, false, true)
            .await
            .ok()
            .unwrap();
        let report = report(outcome);

        assert!(report.dry_run);
        assert_eq!(
            report
                .resources
                .iter()
                .filter(|r| r.action == ResourceAction::Created)
                .count(),
            2
        );
        assert!(
            store
                .get(&ObjectKey::new("Service", "demo", "web"))
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            repository::status::find_by_application(&store, "shop")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_superseded_pass_writes_no_status() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&Fingerprint::new("rev-2"));
        let desired = desired_objects();

        let outcome = run(&harness.ctx(&store), &fingerprint, &desired, false, false)
            .await
            .ok()
            .unwrap();
        assert!(matches!(outcome, PassOutcome::Superseded(_)));
        assert!(
            repository::status::find_by_application(&store, "shop")
                .await
                .unwrap()
                .is_none()
        );
    }

    // ========================================================================
    // Conflict injection
    // ========================================================================

    /// Store wrapper that fails the first N applies per key with a conflict
    struct ConflictInjector {
        inner: MemoryStore,
        remaining: Mutex<HashMap<ObjectKey, u32>>,
    }

    impl ConflictInjector {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                remaining: Mutex::new(HashMap::new()),
            }
        }

        fn inject(&self, key: ObjectKey, conflicts: u32) {
            self.remaining.lock().unwrap().insert(key, conflicts);
        }
    }

    #[async_trait]
    impl ObjectStore for ConflictInjector {
        async fn get(&self, key: &ObjectKey) -> Result<LiveObject, StoreError> {
            self.inner.get(key).await
        }

        async fn list(
            &self,
            namespace: &str,
            selector: Option<(&str, &str)>,
        ) -> Result<Vec<LiveObject>, StoreError> {
            self.inner.list(namespace, selector).await
        }

        async fn apply(
            &self,
            manifest: ManifestObject,
            expected_version: Option<u64>,
        ) -> Result<u64, StoreError> {
            {
                let mut remaining = self.remaining.lock().unwrap();
                if let Some(count) = remaining.get_mut(&manifest.key) {
                    if *count > 0 {
                        *count -= 1;
                        return Err(StoreError::Conflict {
                            key: manifest.key,
                            expected: expected_version,
                            actual: 999,
                        });
                    }
                }
            }
            self.inner.apply(manifest, expected_version).await
        }

        async fn delete(
            &self,
            key: &ObjectKey,
            expected_version: u64,
        ) -> Result<(), StoreError> {
            self.inner.delete(key, expected_version).await
        }

        async fn update_status(
            &self,
            key: &ObjectKey,
            status: Value,
        ) -> Result<u64, StoreError> {
            self.inner.update_status(key, status).await
        }

        async fn watch(&self, namespace: &str) -> WatchSubscription {
            self.inner.watch(namespace).await
        }
    }

    #[tokio::test]
    async fn test_single_conflict_recovers_via_immediate_retry() {
        let store = ConflictInjector::new(MemoryStore::new());
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();
        store.inject(ObjectKey::new("Service", "demo", "web"), 1);

        let outcome = run(&harness.ctx(&store), &fingerprint, &desired, false, false)
            .await
            .ok()
            .unwrap();
        let report = report(outcome);

        assert_eq!(report.phase, SyncPhase::Settled);
        assert!(store.get(&ObjectKey::new("Service", "demo", "web")).await.is_ok());
    }

    #[tokio::test]
    async fn test_exhausted_conflicts_fail_one_object_and_degrade() {
        let store = ConflictInjector::new(MemoryStore::new());
        let fingerprint = Fingerprint::new("rev-1");
        let harness = Harness::new(&fingerprint);
        let desired = desired_objects();
        // More conflicts than the budget allows
        store.inject(ObjectKey::new("Service", "demo", "web"), 100);

        let outcome = run(&harness.ctx(&store), &fingerprint, &desired, false, false)
            .await
            .ok()
            .unwrap();
        let report = report(outcome);

        assert_eq!(report.phase, SyncPhase::Failed);
        assert_eq!(report.health, Health::Degraded);
        assert!(report.message.as_deref().unwrap_or("").contains("web"));

        // The pass still applied the other object
        assert!(
            store
                .get(&ObjectKey::new("ConfigMap", "demo", "web-config"))
                .await
                .is_ok()
        );
        assert!(
            store
                .get(&ObjectKey::new("Service", "demo", "web"))
                .await
                .unwrap_err()
                .is_not_found()
        );

        // And the failure is on record, not silently dropped
        let status =
            repository::status::find_by_application(&store, "shop")
                .await
                .unwrap()
                .unwrap();
        assert_eq!(status.health, Health::Degraded);
        assert!(status.last_error.is_some());
        assert!(status.last_synced.is_none());
    }
}
