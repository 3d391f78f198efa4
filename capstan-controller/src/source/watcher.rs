//! Source watcher
//!
//! Per-application poll loop that resolves the tracked revision and tells
//! the worker when the fingerprint moves. Each observed change is emitted
//! exactly once; resolve failures back off with full jitter and never lose
//! a revision, because the next successful poll observes the head anyway.

use capstan_core::domain::application::Application;
use capstan_core::domain::snapshot::Fingerprint;
use capstan_render::SourceRepository;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{EngineSettings, SyncTrigger};
use crate::util::{Backoff, EventQueue};

/// Polls one application's source for new revisions
pub struct SourceWatcher {
    application: String,
    repo_url: String,
    target_revision: String,
    source: Arc<dyn SourceRepository>,
    queue: Arc<EventQueue<SyncTrigger>>,
    latest: Arc<RwLock<Option<Fingerprint>>>,
    shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
    backoff: Backoff,
}

impl SourceWatcher {
    pub fn new(
        app: &Application,
        source: Arc<dyn SourceRepository>,
        queue: Arc<EventQueue<SyncTrigger>>,
        latest: Arc<RwLock<Option<Fingerprint>>>,
        shutdown: watch::Receiver<bool>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            application: app.name.clone(),
            repo_url: app.repo_url.clone(),
            target_revision: app.target_revision.clone(),
            source,
            queue,
            latest,
            shutdown,
            poll_interval: settings.poll_interval,
            backoff: Backoff::new(settings.backoff_base, settings.backoff_cap),
        }
    }

    pub async fn run(mut self) {
        info!(
            "Source watcher started for application {} ({} @ {})",
            self.application, self.repo_url, self.target_revision
        );
        let mut last_seen: Option<Fingerprint> = None;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self
                .source
                .resolve(&self.repo_url, &self.target_revision)
                .await
            {
                Ok(fingerprint) => {
                    self.backoff.reset();
                    if last_seen.as_ref() != Some(&fingerprint) {
                        info!(
                            "Application {} source moved to {}",
                            self.application,
                            fingerprint.short()
                        );
                        last_seen = Some(fingerprint.clone());
                        *self.latest.write().unwrap() =
                            Some(fingerprint.clone());
                        self.queue.push(SyncTrigger::SourceChanged(fingerprint));
                    }
                    self.poll_interval
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Failed to resolve {} for application {}: {}; retrying in {:?}",
                        self.target_revision, self.application, e, delay
                    );
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        debug!(
            "Source watcher stopped for application {}",
            self.application
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::domain::application::SyncPolicy;
    use capstan_render::FixtureRepository;

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
            poll_interval: Duration::from_millis(10),
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            ..EngineSettings::default()
        }
    }

    fn changed_fingerprints(
        queue: &EventQueue<SyncTrigger>,
    ) -> Vec<Fingerprint> {
        queue
            .drain()
            .into_iter()
            .filter_map(|trigger| match trigger {
                SyncTrigger::SourceChanged(fp) => Some(fp),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_change_is_emitted_exactly_once() {
        let repo = Arc::new(FixtureRepository::new());
        let pushed = repo.push("repo", "main", &[("a.yaml", "kind: ConfigMap")]);

        let queue = Arc::new(EventQueue::new(16));
        let latest = Arc::new(RwLock::new(None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = SourceWatcher::new(
            &demo_app(),
            repo.clone(),
            Arc::clone(&queue),
            Arc::clone(&latest),
            shutdown_rx,
            &fast_settings(),
        );
        let handle = tokio::spawn(watcher.run());

        // Many poll ticks pass, but the unchanged head is reported once
        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = changed_fingerprints(&queue);
        assert_eq!(seen, vec![pushed.clone()]);
        assert_eq!(*latest.read().unwrap(), Some(pushed));

        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_new_revision_is_observed() {
        let repo = Arc::new(FixtureRepository::new());
        let first = repo.push("repo", "main", &[("a.yaml", "kind: ConfigMap")]);

        let queue = Arc::new(EventQueue::new(16));
        let latest = Arc::new(RwLock::new(None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = SourceWatcher::new(
            &demo_app(),
            repo.clone(),
            Arc::clone(&queue),
            Arc::clone(&latest),
            shutdown_rx,
            &fast_settings(),
        );
        let handle = tokio::spawn(watcher.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = repo.push("repo", "main", &[("a.yaml", "kind: Secret")]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = changed_fingerprints(&queue);
        assert_eq!(seen, vec![first, second.clone()]);
        assert_eq!(*latest.read().unwrap(), Some(second));

        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_unresolvable_source_emits_nothing_until_it_exists() {
        let repo = Arc::new(FixtureRepository::new());
        let queue = Arc::new(EventQueue::new(16));
        let latest = Arc::new(RwLock::new(None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = SourceWatcher::new(
            &demo_app(),
            repo.clone(),
            Arc::clone(&queue),
            Arc::clone(&latest),
            shutdown_rx,
            &fast_settings(),
        );
        let handle = tokio::spawn(watcher.run());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(queue.is_empty());

        // Once the branch appears, the next poll picks it up
        let pushed = repo.push("repo", "main", &[("a.yaml", "kind: ConfigMap")]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(changed_fingerprints(&queue), vec![pushed]);

        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }
}
