//! Application Service
//!
//! Business logic for application management: registration, manual sync,
//! status-record lifecycle and removal, wired to the reconciliation
//! engine.

use capstan_core::domain::application::Application;
use capstan_core::dto::application::CreateApplication;
use capstan_core::dto::sync::{SyncReport, SyncRequest};
use capstan_core::error::StoreError;

use crate::engine::{Engine, EngineError};
use crate::repository::{self, SYSTEM_NAMESPACE};
use crate::store::ObjectStore;

/// Service error type
#[derive(Debug)]
pub enum ApplicationError {
    NotFound(String),
    AlreadyExists(String),
    ValidationError(String),
    StoreError(StoreError),
    EngineError(EngineError),
}

impl From<StoreError> for ApplicationError {
    fn from(err: StoreError) -> Self {
        ApplicationError::StoreError(err)
    }
}

impl From<EngineError> for ApplicationError {
    fn from(err: EngineError) -> Self {
        ApplicationError::EngineError(err)
    }
}

pub type Result<T> = std::result::Result<T, ApplicationError>;

/// Register a new application and start tracking it
pub async fn create_application(
    store: &dyn ObjectStore,
    engine: &Engine,
    req: CreateApplication,
) -> Result<Application> {
    let app = Application {
        name: req.name,
        repo_url: req.repo_url,
        path: req.path,
        target_revision: req.target_revision,
        dest_namespace: req.dest_namespace,
        sync_policy: req.sync_policy,
        created_at: chrono::Utc::now(),
    };

    app.validate().map_err(ApplicationError::ValidationError)?;
    if app.dest_namespace == SYSTEM_NAMESPACE {
        return Err(ApplicationError::ValidationError(format!(
            "dest_namespace '{}' is reserved for controller records",
            SYSTEM_NAMESPACE
        )));
    }

    if repository::application::find_by_name(store, &app.name)
        .await?
        .is_some()
    {
        return Err(ApplicationError::AlreadyExists(app.name));
    }

    repository::application::save(store, &app).await?;
    engine.spawn(app.clone());

    tracing::info!(
        "Application created: {} ({} @ {})",
        app.name,
        app.repo_url,
        app.target_revision
    );

    Ok(app)
}

/// Get an application by name
pub async fn get_application(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<Application> {
    repository::application::find_by_name(store, name)
        .await?
        .ok_or_else(|| ApplicationError::NotFound(name.to_string()))
}

/// List all tracked applications
pub async fn list_applications(
    store: &dyn ObjectStore,
) -> Result<Vec<Application>> {
    Ok(repository::application::list(store).await?)
}

/// Run one manual reconciliation pass and wait for its report
pub async fn sync_application(
    store: &dyn ObjectStore,
    engine: &Engine,
    name: &str,
    req: SyncRequest,
) -> Result<SyncReport> {
    // Resolve the name first so an unknown application is a user error,
    // not an engine one
    let _ = repository::application::find_by_name(store, name)
        .await?
        .ok_or_else(|| ApplicationError::NotFound(name.to_string()))?;

    Ok(engine.trigger_manual(name, req).await?)
}

/// Stop tracking an application and delete its records. With cascade the
/// live objects it owns are deleted too; run history stays for audit.
pub async fn delete_application(
    store: &dyn ObjectStore,
    engine: &Engine,
    name: &str,
    cascade: bool,
) -> Result<()> {
    let app = repository::application::find_by_name(store, name)
        .await?
        .ok_or_else(|| ApplicationError::NotFound(name.to_string()))?;

    engine.remove(&app, cascade).await?;
    repository::status::delete(store, name).await?;
    repository::application::delete(store, name).await?;

    tracing::info!("Application deleted: {} (cascade: {})", name, cascade);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::store::MemoryStore;
    use capstan_core::domain::application::{SyncMode, SyncPolicy};
    use capstan_core::domain::object::ObjectKey;
    use capstan_render::FixtureRepository;
    use std::sync::Arc;

    fn harness() -> (Arc<MemoryStore>, Arc<FixtureRepository>, Engine) {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FixtureRepository::new());
        let engine = Engine::new(
            store.clone(),
            source.clone(),
            EngineSettings {
                poll_interval: std::time::Duration::from_millis(25),
                backoff_base: std::time::Duration::from_millis(1),
                backoff_cap: std::time::Duration::from_millis(5),
                ..EngineSettings::default()
            },
        );
        (store, source, engine)
    }

    fn create_request(name: &str) -> CreateApplication {
        CreateApplication {
            name: name.to_string(),
            repo_url: "https://git.example/shop.git".to_string(),
            path: "".to_string(),
            target_revision: "main".to_string(),
            dest_namespace: "demo".to_string(),
            sync_policy: SyncPolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_create_persists_and_tracks() {
        let (store, _source, engine) = harness();

        let app = create_application(
            store.as_ref(),
            &engine,
            create_request("shop"),
        )
        .await
        .unwrap();

        assert_eq!(app.name, "shop");
        assert!(engine.is_tracked("shop"));
        assert!(
            repository::application::find_by_name(store.as_ref(), "shop")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_input() {
        let (store, _source, engine) = harness();

        create_application(store.as_ref(), &engine, create_request("shop"))
            .await
            .unwrap();
        let err = create_application(
            store.as_ref(),
            &engine,
            create_request("shop"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyExists(_)));

        let err = create_application(
            store.as_ref(),
            &engine,
            create_request("Not A Name"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplicationError::ValidationError(_)));

        let mut reserved = create_request("other");
        reserved.dest_namespace = SYSTEM_NAMESPACE.to_string();
        let err = create_application(store.as_ref(), &engine, reserved)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_sync_requires_a_known_application() {
        let (store, _source, engine) = harness();

        let err = sync_application(
            store.as_ref(),
            &engine,
            "ghost",
            SyncRequest::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_reports_the_pass() {
        let (store, source, engine) = harness();
        source.push(
            "https://git.example/shop.git",
            "main",
            &[(
                "service.yaml",
                "kind: Service\nmetadata:\n  name: web\nspec:\n  port: 80\n",
            )],
        );
        create_application(store.as_ref(), &engine, create_request("shop"))
            .await
            .unwrap();

        let report = sync_application(
            store.as_ref(),
            &engine,
            "shop",
            SyncRequest::default(),
        )
        .await
        .unwrap();

        assert!(report.succeeded());
        assert!(
            store
                .get(&ObjectKey::new("Service", "demo", "web"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_delete_with_cascade_clears_everything() {
        let (store, source, engine) = harness();
        source.push(
            "https://git.example/shop.git",
            "main",
            &[(
                "service.yaml",
                "kind: Service\nmetadata:\n  name: web\nspec:\n  port: 80\n",
            )],
        );
        let mut request = create_request("shop");
        request.sync_policy = SyncPolicy {
            mode: SyncMode::Manual,
            self_heal: false,
            prune: false,
        };
        create_application(store.as_ref(), &engine, request)
            .await
            .unwrap();
        sync_application(
            store.as_ref(),
            &engine,
            "shop",
            SyncRequest::default(),
        )
        .await
        .unwrap();

        delete_application(store.as_ref(), &engine, "shop", true)
            .await
            .unwrap();

        assert!(!engine.is_tracked("shop"));
        assert!(
            repository::application::find_by_name(store.as_ref(), "shop")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repository::status::find_by_application(store.as_ref(), "shop")
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.list("demo", None).await.unwrap().is_empty());

        let err = delete_application(store.as_ref(), &engine, "shop", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }
}
